use crate::domain::models::{Dependency, VcsKind, MANIFEST_VERSION};
use crate::services::importpath::contains;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("{0} or a parent of it is already vendored")]
    AlreadyVendored(String),
    #[error("subpackages of {0} are already vendored")]
    SubpackagesPresent(String),
    #[error("dependency does not exist: {0}")]
    NotFound(String),
    #[error("manifest {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("manifest i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest encoding failed: {0}")]
    Encode(serde_json::Error),
}

/// The vendored dependency set. Import paths are kept prefix-free: no entry covers another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// On-disk shape, decoded record by record so entries for unsupported VCSs can be dropped.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    dependencies: Vec<serde_json::Value>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            dependencies: Vec::new(),
        }
    }
}

impl Manifest {
    /// Reads the manifest at `path`. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Manifest, ManifestError> {
        if !path.exists() {
            return Ok(Manifest::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Manifest::parse(&raw).map_err(|source| ManifestError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Decodes and re-inserts every record through [`Manifest::add`], parents first, so
    /// overlapping entries written by older tools are dropped deterministically. Records for
    /// a VCS without a driver are dropped with a warning.
    pub fn parse(raw: &str) -> Result<Manifest, serde_json::Error> {
        let decoded: RawManifest = serde_json::from_str(raw)?;
        let mut deps = Vec::with_capacity(decoded.dependencies.len());
        for value in decoded.dependencies {
            if let Some(vcs) = value.get("vcs").and_then(|v| v.as_str()) {
                if vcs.parse::<VcsKind>().is_err() {
                    tracing::warn!(
                        "dependency {} uses unsupported vcs {:?}, dropped from manifest",
                        value.get("importpath").and_then(|v| v.as_str()).unwrap_or("?"),
                        vcs
                    );
                    continue;
                }
            }
            deps.push(serde_json::from_value::<Dependency>(value)?);
        }
        deps.sort_by(|a, b| a.importpath.cmp(&b.importpath));

        let mut m = Manifest {
            version: decoded.version,
            dependencies: Vec::with_capacity(deps.len()),
        };
        for d in deps {
            if let Err(e) = m.add(d) {
                tracing::warn!("overlapping dependency dropped from manifest: {}", e);
            }
        }
        Ok(m)
    }

    pub fn add(&mut self, dep: Dependency) -> Result<(), ManifestError> {
        if self.covers(&dep.importpath) {
            return Err(ManifestError::AlreadyVendored(dep.importpath));
        }
        if !self.subpackages_of(&dep.importpath).is_empty() {
            return Err(ManifestError::SubpackagesPresent(dep.importpath));
        }
        self.dependencies.push(dep);
        Ok(())
    }

    pub fn remove(&mut self, dep: &Dependency) -> Result<(), ManifestError> {
        let pos = self
            .dependencies
            .iter()
            .position(|d| d == dep)
            .ok_or_else(|| ManifestError::NotFound(dep.importpath.clone()))?;
        self.dependencies.remove(pos);
        Ok(())
    }

    pub fn covers(&self, path: &str) -> bool {
        self.owner(path).is_some()
    }

    /// The entry that is `path` or one of its ancestors.
    pub fn owner(&self, path: &str) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .find(|d| contains(&d.importpath, path))
    }

    pub fn find_exact(&self, path: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.importpath == path)
    }

    /// Entries strictly nested under `path`.
    pub fn subpackages_of(&self, path: &str) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.importpath != path && contains(path, &d.importpath))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Tab-indented JSON with dependencies sorted by import path.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        let mut sorted = self.clone();
        sorted
            .dependencies
            .sort_by(|a, b| a.importpath.cmp(&b.importpath));

        let mut buf = Vec::new();
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
        sorted.serialize(&mut ser).map_err(ManifestError::Encode)?;
        buf.push(b'\n');
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Writes the manifest, or deletes the file when there are no dependencies.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if self.is_empty() {
            return match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
