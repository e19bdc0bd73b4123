use crate::domain::models::{Pin, VcsKind};
use crate::services::importpath::{contains, parse_url, scheme, strip_scheme};
use crate::vcs::{all_drivers, driver};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const INSECURE_SCHEMES: [&str; 2] = ["http", "git"];
const VCS_SUFFIXES: [(&str, VcsKind); 3] = [
    (".git", VcsKind::Git),
    (".hg", VcsKind::Hg),
    (".bzr", VcsKind::Bzr),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub url: String,
    pub vcs: VcsKind,
}

pub trait WorkingCopy {
    fn revision(&self) -> anyhow::Result<String>;
    fn branch(&self) -> anyhow::Result<String>;
    fn dir(&self) -> &Path;
}

pub trait Downloader {
    /// Finds the repository holding `path` and the sub-path of `path` inside it.
    fn deduce_repository(
        &mut self,
        path: &str,
        allow_insecure: bool,
    ) -> anyhow::Result<(RemoteRepo, String)>;

    fn checkout(
        &mut self,
        repo: &RemoteRepo,
        pin: &Pin,
        verbose: bool,
    ) -> anyhow::Result<Box<dyn WorkingCopy>>;
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("insecure protocol {0}:// not allowed (pass --insecure)")]
    InsecureProtocol(String),
    #[error("no repository found for {0}")]
    NoRepository(String),
    #[error("no go-import meta tag for {0}")]
    NoMetaTag(String),
}

struct VcsWorkingCopy {
    dir: PathBuf,
    vcs: VcsKind,
    requested_branch: Option<String>,
}

impl WorkingCopy for VcsWorkingCopy {
    fn revision(&self) -> anyhow::Result<String> {
        driver(self.vcs).revision(&self.dir)
    }

    fn branch(&self) -> anyhow::Result<String> {
        match &self.requested_branch {
            Some(b) => Ok(b.clone()),
            None => driver(self.vcs).branch(&self.dir),
        }
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Resolves import paths against known hosts, explicit URLs and go-get discovery, and keeps
/// one checkout per (repository, pin) for the lifetime of the command.
pub struct RemoteDownloader {
    work_dir: PathBuf,
    timeout_ms: u64,
    checkouts: HashMap<String, PathBuf>,
}

impl RemoteDownloader {
    pub fn new(timeout_ms: u64) -> Self {
        RemoteDownloader {
            work_dir: std::env::temp_dir().join(format!("vendr-{}", std::process::id())),
            timeout_ms,
            checkouts: HashMap::new(),
        }
    }

    /// Deletes every checkout made by this downloader.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.checkouts.clear();
        match std::fs::remove_dir_all(&self.work_dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn discover(&self, path: &str, allow_insecure: bool) -> anyhow::Result<(RemoteRepo, String)> {
        let mut last_err = None;
        let schemes: &[&str] = if allow_insecure {
            &["https", "http"]
        } else {
            &["https"]
        };
        for s in schemes {
            let url = format!("{}://{}?go-get=1", s, path);
            match fetch_text(&url, self.timeout_ms) {
                Ok(body) => return match_meta_tags(&body, path),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| RemoteError::NoMetaTag(path.to_string()).into()))
    }
}

impl Default for RemoteDownloader {
    fn default() -> Self {
        RemoteDownloader::new(10_000)
    }
}

impl Drop for RemoteDownloader {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl Downloader for RemoteDownloader {
    fn deduce_repository(
        &mut self,
        path: &str,
        allow_insecure: bool,
    ) -> anyhow::Result<(RemoteRepo, String)> {
        let explicit = scheme(path);
        if let Some(s) = explicit.as_deref() {
            if INSECURE_SCHEMES.contains(&s) && !allow_insecure {
                return Err(RemoteError::InsecureProtocol(s.to_string()).into());
            }
        }

        let bare = strip_scheme(path);
        // Local paths (file:///...) have no host to match against.
        if !bare.starts_with('/') {
            if let Some((repo, sub)) = known_host(&bare).or_else(|| vcs_suffix(&bare)) {
                let url = match explicit.as_deref() {
                    Some(s) => with_scheme(s, &repo.url),
                    None => repo.url,
                };
                return Ok((RemoteRepo { url, vcs: repo.vcs }, sub));
            }
        }

        if let Some(url) = parse_url(path) {
            return probe_prefixes(url);
        }
        self.discover(&bare, allow_insecure)
    }

    fn checkout(
        &mut self,
        repo: &RemoteRepo,
        pin: &Pin,
        verbose: bool,
    ) -> anyhow::Result<Box<dyn WorkingCopy>> {
        let key = checkout_key(repo, pin);
        let dir = match self.checkouts.get(&key) {
            Some(dir) => dir.clone(),
            None => {
                let dir = self.work_dir.join(&key);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                std::fs::create_dir_all(&self.work_dir)?;
                driver(repo.vcs).checkout(&repo.url, &dir, pin, verbose)?;
                self.checkouts.insert(key, dir.clone());
                dir
            }
        };
        Ok(Box::new(VcsWorkingCopy {
            dir,
            vcs: repo.vcs,
            requested_branch: pin.branch.clone(),
        }))
    }
}

fn checkout_key(repo: &RemoteRepo, pin: &Pin) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo.url.as_bytes());
    hasher.update(repo.vcs.as_str().as_bytes());
    for part in [&pin.branch, &pin.tag, &pin.revision] {
        hasher.update(b"\0");
        hasher.update(part.as_deref().unwrap_or("").as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn fetch_text(url: &str, timeout_ms: u64) -> anyhow::Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?;
    let resp = client.get(url).send()?.error_for_status()?;
    Ok(resp.text()?)
}

/// Rebuilds `url` under scheme `s`, keeping host and path.
fn with_scheme(s: &str, url: &str) -> String {
    let Some(mut parsed) = parse_url(url) else {
        return format!("{}://{}", s, url);
    };
    // The url crate refuses to move between special and non-special schemes.
    if parsed.set_scheme(s).is_ok() {
        return parsed.to_string();
    }
    format!("{}://{}", s, strip_scheme(url))
}

fn split_at(segments: &[&str], n: usize) -> (String, String) {
    (segments[..n].join("/"), segments[n..].join("/"))
}

/// Repository layout of well-known hosts, resolved without network access.
pub fn known_host(path: &str) -> Option<(RemoteRepo, String)> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let git = |url: String, n: usize| {
        Some((
            RemoteRepo {
                url,
                vcs: VcsKind::Git,
            },
            segs[n..].join("/"),
        ))
    };
    match segs.first().copied()? {
        "github.com" | "gitlab.com" | "bitbucket.org" if segs.len() >= 3 => {
            git(format!("https://{}", segs[..3].join("/")), 3)
        }
        "golang.org" if segs.len() >= 3 && segs[1] == "x" => {
            git(format!("https://go.googlesource.com/{}", segs[2]), 3)
        }
        "gopkg.in" if segs.len() >= 2 => {
            let n = if is_gopkg_versioned(segs[1]) { 2 } else { 3 };
            if segs.len() < n || (n == 3 && !is_gopkg_versioned(segs[2])) {
                return None;
            }
            git(format!("https://{}", segs[..n].join("/")), n)
        }
        _ => None,
    }
}

fn is_gopkg_versioned(seg: &str) -> bool {
    match seg.rsplit_once(".v") {
        Some((name, major)) => {
            !name.is_empty() && !major.is_empty() && major.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// A segment ending in `.git`, `.hg` or `.bzr` marks the repository root.
pub fn vcs_suffix(path: &str) -> Option<(RemoteRepo, String)> {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for (i, seg) in segs.iter().enumerate().skip(1) {
        for (suffix, kind) in VCS_SUFFIXES {
            if seg.len() > suffix.len() && seg.ends_with(suffix) {
                let (root, sub) = split_at(&segs, i + 1);
                return Some((
                    RemoteRepo {
                        url: format!("https://{}", root),
                        vcs: kind,
                    },
                    sub,
                ));
            }
        }
    }
    None
}

/// Tries every prefix of a scheme-qualified URL, longest first, against every VCS driver.
fn probe_prefixes(url: Url) -> anyhow::Result<(RemoteRepo, String)> {
    let segs: Vec<String> = url
        .path_segments()
        .map(|it| it.filter(|x| !x.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    for n in (1..=segs.len()).rev() {
        let mut candidate = url.clone();
        candidate.set_query(None);
        candidate.set_fragment(None);
        candidate.set_path(&segs[..n].join("/"));
        let candidate = candidate.to_string();
        for d in all_drivers() {
            if d.probe(&candidate) {
                return Ok((
                    RemoteRepo {
                        url: candidate,
                        vcs: d.kind(),
                    },
                    segs[n..].join("/"),
                ));
            }
        }
    }
    Err(RemoteError::NoRepository(url.to_string()).into())
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    for quote in ['"', '\''] {
        let needle = format!("{}={}", name, quote);
        if let Some(start) = tag.find(&needle) {
            let rest = &tag[start + needle.len()..];
            return rest.find(quote).map(|end| &rest[..end]);
        }
    }
    None
}

/// Picks the `go-import` meta tag whose prefix covers `path`.
pub fn match_meta_tags(body: &str, path: &str) -> anyhow::Result<(RemoteRepo, String)> {
    let mut best: Option<(String, RemoteRepo)> = None;
    let mut rest = body;
    while let Some(start) = rest.find("<meta") {
        let tail = &rest[start..];
        let end = tail.find('>').unwrap_or(tail.len());
        let tag = &tail[..end];
        rest = &tail[end..];

        if attr(tag, "name") != Some("go-import") {
            continue;
        }
        let Some(content) = attr(tag, "content") else {
            continue;
        };
        let fields: Vec<&str> = content.split_whitespace().collect();
        let [prefix, vcs, url] = fields.as_slice() else {
            continue;
        };
        let Ok(vcs) = vcs.parse::<VcsKind>() else {
            continue;
        };
        if !contains(prefix, path) {
            continue;
        }
        if best.as_ref().map(|(p, _)| prefix.len() > p.len()).unwrap_or(true) {
            best = Some((
                prefix.to_string(),
                RemoteRepo {
                    url: url.to_string(),
                    vcs,
                },
            ));
        }
    }
    let (prefix, repo) = best.ok_or_else(|| RemoteError::NoMetaTag(path.to_string()))?;
    let sub = path[prefix.len()..].trim_start_matches('/').to_string();
    Ok((repo, sub))
}
