use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only list of import paths whose fetch failed.
#[derive(Debug, Clone)]
pub struct RetryLedger {
    path: PathBuf,
}

impl RetryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RetryLedger { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, import_path: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(format!("{}\n", import_path).as_bytes())?;
        Ok(())
    }

    pub fn entries(&self) -> anyhow::Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        Ok(std::fs::read_to_string(&self.path)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Reads every recorded path and deletes the ledger.
    pub fn take(&self) -> anyhow::Result<Vec<String>> {
        let entries = self.entries()?;
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        Ok(entries)
    }
}
