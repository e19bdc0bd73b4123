use crate::domain::models::{Pin, VcsKind};
use std::path::Path;
use std::process::{Command, Stdio};

/// Version-control operations the downloader needs from one VCS.
pub trait VcsDriver {
    fn kind(&self) -> VcsKind;
    /// Reports whether `url` answers as a repository of this kind.
    fn probe(&self, url: &str) -> bool;
    fn checkout(&self, url: &str, dest: &Path, pin: &Pin, verbose: bool) -> anyhow::Result<()>;
    fn revision(&self, dir: &Path) -> anyhow::Result<String>;
    fn branch(&self, dir: &Path) -> anyhow::Result<String>;
}

pub struct Git;
pub struct Mercurial;
pub struct Bazaar;

pub fn driver(kind: VcsKind) -> &'static dyn VcsDriver {
    match kind {
        VcsKind::Git => &Git,
        VcsKind::Hg => &Mercurial,
        VcsKind::Bzr => &Bazaar,
    }
}

pub fn all_drivers() -> [&'static dyn VcsDriver; 3] {
    [&Git, &Mercurial, &Bazaar]
}

fn run(cmd: &mut Command, verbose: bool) -> anyhow::Result<String> {
    let program = format!("{:?}", cmd);
    if verbose {
        cmd.stderr(Stdio::inherit());
    }
    let out = cmd
        .output()
        .map_err(|e| anyhow::anyhow!("failed to run {}: {}", program, e))?;
    if !out.status.success() {
        anyhow::bail!(
            "{} failed: {}",
            program,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn quiet(cmd: &mut Command) -> bool {
    cmd.stdout(Stdio::null())
        .stderr(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0")
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

impl VcsDriver for Git {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    fn probe(&self, url: &str) -> bool {
        quiet(Command::new("git").args(["ls-remote", "--heads", url]))
    }

    fn checkout(&self, url: &str, dest: &Path, pin: &Pin, verbose: bool) -> anyhow::Result<()> {
        let mut clone = Command::new("git");
        clone.arg("clone").env("GIT_TERMINAL_PROMPT", "0");
        if !verbose {
            clone.arg("-q");
        }
        if let Some(b) = &pin.branch {
            clone.args(["--branch", b]);
        }
        clone.arg(url).arg(dest);
        run(&mut clone, verbose)?;

        let target = match (&pin.tag, &pin.revision) {
            (Some(tag), _) => Some(format!("tags/{}", tag)),
            (None, Some(rev)) => Some(rev.clone()),
            (None, None) => None,
        };
        if let Some(t) = target {
            run(
                Command::new("git")
                    .arg("-C")
                    .arg(dest)
                    .args(["checkout", "-q", &t]),
                verbose,
            )?;
        }
        Ok(())
    }

    fn revision(&self, dir: &Path) -> anyhow::Result<String> {
        run(
            Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(["rev-parse", "HEAD"]),
            false,
        )
    }

    fn branch(&self, dir: &Path) -> anyhow::Result<String> {
        let b = run(
            Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(["rev-parse", "--abbrev-ref", "HEAD"]),
            false,
        )?;
        Ok(if b == "HEAD" { String::new() } else { b })
    }
}

impl VcsDriver for Mercurial {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    fn probe(&self, url: &str) -> bool {
        quiet(Command::new("hg").args(["identify", url]))
    }

    fn checkout(&self, url: &str, dest: &Path, pin: &Pin, verbose: bool) -> anyhow::Result<()> {
        let mut clone = Command::new("hg");
        clone.arg("clone");
        if !verbose {
            clone.arg("-q");
        }
        if let Some(b) = &pin.branch {
            clone.args(["-b", b]);
        }
        if let Some(rev) = pin.tag.as_ref().or(pin.revision.as_ref()) {
            clone.args(["-u", rev]);
        }
        clone.arg(url).arg(dest);
        run(&mut clone, verbose)?;
        Ok(())
    }

    fn revision(&self, dir: &Path) -> anyhow::Result<String> {
        run(
            Command::new("hg")
                .arg("--cwd")
                .arg(dir)
                .args(["log", "-r", ".", "--template", "{node}"]),
            false,
        )
    }

    fn branch(&self, dir: &Path) -> anyhow::Result<String> {
        run(Command::new("hg").arg("--cwd").arg(dir).arg("branch"), false)
    }
}

impl VcsDriver for Bazaar {
    fn kind(&self) -> VcsKind {
        VcsKind::Bzr
    }

    fn probe(&self, url: &str) -> bool {
        quiet(Command::new("bzr").args(["info", url]))
    }

    fn checkout(&self, url: &str, dest: &Path, pin: &Pin, verbose: bool) -> anyhow::Result<()> {
        if pin.branch.is_some() {
            anyhow::bail!("bzr does not support checking out a named branch; use the branch URL");
        }
        let mut branch = Command::new("bzr");
        branch.arg("branch");
        if !verbose {
            branch.arg("-q");
        }
        match (&pin.tag, &pin.revision) {
            (Some(tag), _) => {
                branch.args(["-r", &format!("tag:{}", tag)]);
            }
            (None, Some(rev)) => {
                branch.args(["-r", &format!("revid:{}", rev)]);
            }
            (None, None) => {}
        }
        branch.arg(url).arg(dest);
        run(&mut branch, verbose)?;
        Ok(())
    }

    fn revision(&self, dir: &Path) -> anyhow::Result<String> {
        run(
            Command::new("bzr")
                .args(["version-info", "--custom", "--template={revision_id}"])
                .arg(dir),
            false,
        )
    }

    fn branch(&self, _dir: &Path) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
