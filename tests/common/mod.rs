#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    _tmp: TempDir,
    pub home: PathBuf,
    pub project: PathBuf,
    pub repos: PathBuf,
    cargo_home: PathBuf,
    rustup_home: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let home = tmp.path().join("home");
        let project = tmp.path().join("project");
        let repos = tmp.path().join("repos");
        fs::create_dir_all(&home).expect("create isolated home");
        fs::create_dir_all(&project).expect("create project dir");
        fs::create_dir_all(&repos).expect("create repos dir");

        let orig_home = std::env::var("HOME").unwrap_or_default();
        let cargo_home = PathBuf::from(&orig_home).join(".cargo");
        let rustup_home = PathBuf::from(&orig_home).join(".rustup");

        Self {
            _tmp: tmp,
            home,
            project,
            repos,
            cargo_home,
            rustup_home,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("vendr");
        cmd.env("HOME", &self.home)
            .env("CARGO_HOME", &self.cargo_home)
            .env("RUSTUP_HOME", &self.rustup_home)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env_remove("GOPATH")
            .env_remove("RUST_LOG")
            .current_dir(&self.project);
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }

    pub fn fail_json(&self, args: &[&str]) -> Value {
        let mut cmd = self.cmd();
        let out = cmd
            .arg("--json")
            .args(args)
            .assert()
            .failure()
            .code(1)
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json error output")
    }

    pub fn vendor(&self, rel: &str) -> PathBuf {
        self.project.join("vendor").join(rel)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.vendor("manifest")
    }

    pub fn write_manifest(&self, manifest: &Value) {
        let path = self.manifest_path();
        fs::create_dir_all(path.parent().expect("vendor dir")).expect("create vendor dir");
        fs::write(
            path,
            serde_json::to_string_pretty(manifest).expect("serialize manifest"),
        )
        .expect("write manifest");
    }

    pub fn read_manifest(&self) -> Value {
        let raw = fs::read_to_string(self.manifest_path()).expect("read manifest");
        serde_json::from_str(&raw).expect("manifest is json")
    }

    pub fn write_project_file(&self, rel: &str, body: &str) {
        write_file(&self.project.join(rel), body);
    }

    /// Creates a one-commit git repository on `master` under the scratch repos directory.
    pub fn git_repo(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.repos.join(name);
        fs::create_dir_all(&dir).expect("create repo dir");
        git(&dir, &["init", "-q"]);
        git(&dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        for (rel, body) in files {
            write_file(&dir.join(rel), body);
        }
        git(&dir, &["add", "-A"]);
        git(&dir, &["commit", "-q", "-m", "initial"]);
        dir
    }

    /// Points import path prefixes at local repositories through the project mirror file.
    pub fn mirror(&self, rules: &[(&str, &Path)]) {
        let body: String = rules
            .iter()
            .map(|(prefix, dir)| format!("{} file://{}\n", prefix, dir.display()))
            .collect();
        self.write_project_file("vendr.mirrors", &body);
    }
}

pub fn write_file(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dir");
    fs::write(path, body).expect("write file");
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

pub fn dependency(importpath: &str, revision: &str) -> Value {
    serde_json::json!({
        "importpath": importpath,
        "repository": format!("https://{}", importpath),
        "vcs": "git",
        "revision": revision,
        "branch": "master",
        "notests": true
    })
}

pub fn fixture_manifest() -> Value {
    serde_json::json!({
        "version": 0,
        "dependencies": [
            dependency("github.com/zeta/tool", "2222222222222222222222222222222222222222"),
            dependency("github.com/alpha/lib", "1111111111111111111111111111111111111111"),
            dependency("golang.org/x/text", "3333333333333333333333333333333333333333")
        ]
    })
}
