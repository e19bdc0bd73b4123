use crate::domain::models::ConfigFile;
use std::path::{Path, PathBuf};

pub const VENDOR_DIR: &str = "vendor";
pub const MANIFEST_FILE: &str = "manifest";
pub const LEDGER_FILE: &str = "failed-fetches";
pub const LOCK_FILE: &str = ".vendr.lock";
pub const PROJECT_MIRROR_FILE: &str = "vendr.mirrors";

/// Where a project keeps its vendored code and bookkeeping files.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub vendor_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub ledger_path: PathBuf,
    /// The project's own import path, when it can be determined.
    pub import_path: Option<String>,
}

impl ProjectLayout {
    pub fn new(root: &Path, import_path: Option<String>) -> Self {
        let vendor_dir = root.join(VENDOR_DIR);
        ProjectLayout {
            root: root.to_path_buf(),
            manifest_path: vendor_dir.join(MANIFEST_FILE),
            ledger_path: vendor_dir.join(LEDGER_FILE),
            vendor_dir,
            import_path,
        }
    }

    pub fn discover(config: &ConfigFile) -> anyhow::Result<Self> {
        let root = std::env::current_dir()?;
        let import_path = config
            .general
            .import_path
            .clone()
            .or_else(|| gopath_import_path(&root))
            .or_else(|| go_mod_import_path(&root));
        if import_path.is_none() {
            tracing::debug!("project import path unknown; self-vendoring checks disabled");
        }
        Ok(ProjectLayout::new(&root, import_path))
    }
}

fn config_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")?;
    Ok(PathBuf::from(home).join(".config/vendr"))
}

pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = config_dir()?.join("config.toml");
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))
}

pub fn mirror_file(config: &ConfigFile, layout: &ProjectLayout) -> Option<PathBuf> {
    if let Some(p) = &config.general.mirror_file {
        return Some(PathBuf::from(p));
    }
    let local = layout.root.join(PROJECT_MIRROR_FILE);
    if local.exists() {
        return Some(local);
    }
    config_dir().ok().map(|d| d.join("mirrors"))
}

pub fn gopath_src_dirs() -> Vec<PathBuf> {
    std::env::var_os("GOPATH")
        .map(|v| std::env::split_paths(&v).map(|p| p.join("src")).collect())
        .unwrap_or_default()
}

fn gopath_import_path(root: &Path) -> Option<String> {
    gopath_src_dirs().into_iter().find_map(|src| {
        let rel = root.strip_prefix(&src).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    })
}

fn go_mod_import_path(root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(root.join("go.mod")).ok()?;
    raw.lines().find_map(|l| {
        let rest = l.trim().strip_prefix("module")?;
        let name = rest.trim().trim_matches('"');
        (!name.is_empty() && rest.starts_with(char::is_whitespace)).then(|| name.to_string())
    })
}

/// Exclusive marker held while a command mutates the vendor directory.
pub struct ProjectLock {
    path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
#[error("another vendr process is working on this project (remove {} if it is stale)", .0.display())]
pub struct LockedError(pub PathBuf);

impl ProjectLock {
    pub fn acquire(layout: &ProjectLayout) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&layout.vendor_dir)?;
        let path = layout.vendor_dir.join(LOCK_FILE);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut f) => {
                std::io::Write::write_all(&mut f, format!("{}\n", std::process::id()).as_bytes())?;
                Ok(ProjectLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LockedError(path).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        if let Some(vendor) = self.path.parent() {
            // Leave no empty vendor directory behind after a no-op command.
            let _ = std::fs::remove_dir(vendor);
        }
    }
}
