use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MANIFEST_VERSION: u32 = 0;

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

#[derive(Serialize)]
pub struct JsonErr {
    pub ok: bool,
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Hg,
    Bzr,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Hg => "hg",
            VcsKind::Bzr => "bzr",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VcsKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsKind::Git),
            "hg" => Ok(VcsKind::Hg),
            "bzr" => Ok(VcsKind::Bzr),
            other => anyhow::bail!("unsupported vcs: {}", other),
        }
    }
}

/// One vendored import path, sourced from `repository` at `revision`, copied from
/// `path` inside the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub importpath: String,
    pub repository: String,
    pub vcs: VcsKind,
    pub revision: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Kept in the negative so manifests written before test filtering existed stay valid.
    #[serde(default, skip_serializing_if = "is_false")]
    pub notests: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allfiles: bool,
}

/// Branch, tag and revision requested for a checkout. All empty means default branch at tip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Pin {
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub revision: Option<String>,
}

impl Pin {
    pub fn revision(rev: &str) -> Self {
        Pin {
            revision: Some(rev.to_string()),
            ..Pin::default()
        }
    }

    pub fn is_tip(&self) -> bool {
        self.branch.is_none() && self.tag.is_none() && self.revision.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub pin: Pin,
    pub no_recurse: bool,
    pub insecure: bool,
    pub tests: bool,
    pub all: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Fetched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchEvent {
    pub importpath: String,
    pub level: usize,
    pub status: FetchStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct FetchReport {
    pub requested: Vec<String>,
    pub events: Vec<FetchEvent>,
}

/// Per-entry outcome of `restore` and `update`.
#[derive(Debug, Serialize)]
pub struct RestoreReport {
    pub importpath: String,
    pub status: String,
    pub detail: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub general: ConfigGeneral,
}

#[derive(Debug, Deserialize)]
pub struct ConfigGeneral {
    #[serde(default)]
    pub import_path: Option<String>,
    #[serde(default)]
    pub mirror_file: Option<String>,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub allow_insecure: bool,
}

impl Default for ConfigGeneral {
    fn default() -> Self {
        ConfigGeneral {
            import_path: None,
            mirror_file: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            allow_insecure: false,
        }
    }
}
