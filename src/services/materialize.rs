use crate::services::importpath::repo_root;
use std::path::{Path, PathBuf};
use tracing::debug;

const VCS_DIRS: [&str; 4] = [".git", ".hg", ".bzr", ".svn"];
const LICENSE_PREFIXES: [&str; 6] = ["LICENSE", "LICENCE", "COPYING", "NOTICE", "PATENTS", "UNLICENSE"];

pub trait Materializer {
    fn copy_tree(&self, dst: &Path, src: &Path, tests: bool, all: bool) -> anyhow::Result<()>;
    /// Copies license files of the working-copy root and of every directory down to
    /// `sub_path` into the matching directories under `vendor_dir`.
    fn copy_license(
        &self,
        vendor_dir: &Path,
        import_path: &str,
        wc_root: &Path,
        sub_path: &str,
    ) -> anyhow::Result<()>;
}

/// Reports whether a directory entry is left out of a vendored copy.
pub fn should_skip(name: &str, is_dir: bool, tests: bool, all: bool) -> bool {
    if is_dir && VCS_DIRS.contains(&name) {
        return true;
    }
    if all {
        return false;
    }
    if name.starts_with('.') || name.starts_with('_') {
        return true;
    }
    if is_dir {
        return !tests && name == "testdata";
    }
    !tests && name.ends_with("_test.go")
}

pub fn is_license_file(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    LICENSE_PREFIXES.iter().any(|p| upper.starts_with(p))
}

pub struct FsMaterializer;

impl Materializer for FsMaterializer {
    fn copy_tree(&self, dst: &Path, src: &Path, tests: bool, all: bool) -> anyhow::Result<()> {
        if !src.is_dir() {
            anyhow::bail!("source directory does not exist: {}", src.display());
        }
        if dst.exists() {
            std::fs::remove_dir_all(dst)?;
        }
        copy_filtered(src, dst, tests, all)
    }

    fn copy_license(
        &self,
        vendor_dir: &Path,
        import_path: &str,
        wc_root: &Path,
        sub_path: &str,
    ) -> anyhow::Result<()> {
        if import_path.trim_matches('/').is_empty()
            || has_dot_segment(import_path)
            || has_dot_segment(sub_path)
        {
            anyhow::bail!("refusing to copy licenses for {} ({})", import_path, sub_path);
        }
        let dst = vendor_path(vendor_dir, import_path);
        let Some(root) = repo_root(import_path, sub_path) else {
            debug!(
                "{} is not laid out like its repository, copying root licenses only",
                import_path
            );
            return copy_licenses_in(wc_root, &dst);
        };
        let mut from = wc_root.to_path_buf();
        let mut to = vendor_path(vendor_dir, root);
        copy_licenses_in(&from, &to)?;
        for seg in sub_path.split('/').filter(|s| !s.is_empty()) {
            from.push(seg);
            to.push(seg);
            copy_licenses_in(&from, &to)?;
        }
        Ok(())
    }
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|seg| seg == "." || seg == "..")
}

fn copy_filtered(src: &Path, dst: &Path, tests: bool, all: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().to_string();
        if should_skip(&name, ty.is_dir(), tests, all) {
            continue;
        }
        let to = dst.join(&name);
        if ty.is_symlink() {
            copy_symlink(&entry.path(), &to)?;
        } else if ty.is_dir() {
            copy_filtered(&entry.path(), &to, tests, all)?;
        } else {
            std::fs::copy(entry.path(), to)?;
        }
    }
    Ok(())
}

/// Recreates the link itself. Targets are never followed, so links to directories and
/// dangling links copy like any other entry.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> anyhow::Result<()> {
    debug!("skipping symbolic link {}", src.display());
    Ok(())
}

fn copy_licenses_in(from: &Path, to: &Path) -> anyhow::Result<()> {
    if !from.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_license_file(&name) {
            continue;
        }
        std::fs::create_dir_all(to)?;
        let target = to.join(&name);
        if !target.exists() {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

pub fn vendor_path(vendor_dir: &Path, import_path: &str) -> PathBuf {
    import_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(vendor_dir.to_path_buf(), |p, s| p.join(s))
}

/// Deletes the vendored tree of `import_path` and prunes parents left empty, stopping at the
/// vendor root.
pub fn remove_vendor_tree(vendor_dir: &Path, import_path: &str) -> anyhow::Result<()> {
    let target = vendor_path(vendor_dir, import_path);
    match std::fs::remove_dir_all(&target) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    let mut dir = target.parent();
    while let Some(d) = dir {
        if d == vendor_dir || !d.starts_with(vendor_dir) {
            break;
        }
        let empty = std::fs::read_dir(d)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !empty {
            break;
        }
        std::fs::remove_dir(d)?;
        dir = d.parent();
    }
    Ok(())
}
