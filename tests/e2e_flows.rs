mod common;

use common::{dependency, fixture_manifest, git, git_available, TestEnv};
use predicates::prelude::*;
use std::fs;

#[test]
fn list_prints_manifest_sorted_by_import_path() {
    let env = TestEnv::new();
    env.write_manifest(&fixture_manifest());

    let list = env.run_json(&["list"]);
    assert_eq!(list["ok"], true);
    let deps = list["data"].as_array().expect("dependency array");
    let paths: Vec<&str> = deps
        .iter()
        .map(|d| d["importpath"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec!["github.com/alpha/lib", "github.com/zeta/tool", "golang.org/x/text"]
    );

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "github.com/alpha/lib\thttps://github.com/alpha/lib\t1111111111111111111111111111111111111111\tmaster\n",
        ));
}

#[test]
fn list_without_manifest_is_empty() {
    let env = TestEnv::new();
    let list = env.run_json(&["list"]);
    assert_eq!(list["ok"], true);
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
    assert!(!env.vendor("").exists());
}

#[test]
fn fetch_of_vendored_path_fails_with_already_vendored() {
    let env = TestEnv::new();
    env.write_manifest(&fixture_manifest());

    let err = env.fail_json(&["fetch", "github.com/alpha/lib/sub/pkg"]);
    assert_eq!(err["ok"], false);
    assert_eq!(err["error"]["code"], "ALREADY_VENDORED");
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains("github.com/alpha/lib/sub/pkg"));
    assert!(!env.vendor(".vendr.lock").exists());
}

#[test]
fn fetch_inside_own_module_is_refused() {
    let env = TestEnv::new();
    env.write_project_file("go.mod", "module example.com/me/app\n\ngo 1.21\n");

    let err = env.fail_json(&["fetch", "example.com/me/app/internal/db"]);
    assert_eq!(err["error"]["code"], "SELF_VENDOR");
}

#[test]
fn insecure_scheme_is_refused_and_deferred() {
    let env = TestEnv::new();

    let err = env.fail_json(&["fetch", "http://example.com/repos/lib.git"]);
    assert_eq!(err["error"]["code"], "FETCH_FAILED");
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains("insecure protocol"));
    assert_eq!(
        fs::read_to_string(env.vendor("failed-fetches")).unwrap(),
        "http://example.com/repos/lib.git\n"
    );
}

#[test]
fn malformed_manifest_fails_unless_forced() {
    let env = TestEnv::new();
    fs::create_dir_all(env.vendor("")).unwrap();
    fs::write(env.manifest_path(), "{ not json").unwrap();

    let err = env.fail_json(&["list"]);
    assert_eq!(err["error"]["code"], "MANIFEST_INVALID");

    let forced = env.run_json(&["--force", "list"]);
    assert_eq!(forced["ok"], true);
    assert_eq!(forced["data"].as_array().unwrap().len(), 0);
}

#[test]
fn held_lock_blocks_mutating_commands() {
    let env = TestEnv::new();
    env.write_manifest(&fixture_manifest());
    fs::write(env.vendor(".vendr.lock"), "12345\n").unwrap();

    let err = env.fail_json(&["delete", "golang.org/x/text"]);
    assert_eq!(err["error"]["code"], "LOCKED");
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains(".vendr.lock"));

    let list = env.run_json(&["list"]);
    assert_eq!(list["data"].as_array().unwrap().len(), 3);
}

#[test]
fn delete_removes_entry_and_vendor_tree() {
    let env = TestEnv::new();
    env.write_manifest(&fixture_manifest());
    common::write_file(&env.vendor("golang.org/x/text/text.go"), "package text");
    common::write_file(&env.vendor("github.com/alpha/lib/lib.go"), "package lib");

    let deleted = env.run_json(&["delete", "golang.org/x/text"]);
    assert_eq!(deleted["data"][0]["importpath"], "golang.org/x/text");
    assert!(!env.vendor("golang.org").exists());
    assert!(env.vendor("github.com/alpha/lib/lib.go").exists());

    let manifest = env.read_manifest();
    assert_eq!(manifest["dependencies"].as_array().unwrap().len(), 2);

    let missing = env.fail_json(&["delete", "golang.org/x/text"]);
    assert!(missing["error"]["message"]
        .as_str()
        .unwrap()
        .contains("does not exist"));

    let all = env.run_json(&["delete", "--all"]);
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
    assert!(!env.manifest_path().exists());
    assert!(!env.vendor("github.com").exists());
}

#[test]
fn fix_with_empty_ledger_succeeds() {
    let env = TestEnv::new();
    let fix = env.run_json(&["fix"]);
    assert_eq!(fix["ok"], true);
    assert_eq!(fix["data"]["requested"].as_array().unwrap().len(), 0);

    let alias = env.run_json(&["fetch", "fix"]);
    assert_eq!(alias["ok"], true);
}

#[test]
fn rebuild_is_accepted_as_restore() {
    let env = TestEnv::new();
    let rebuilt = env.run_json(&["rebuild"]);
    assert_eq!(rebuilt["ok"], true);
    assert_eq!(rebuilt["data"].as_array().unwrap().len(), 0);
}

#[test]
fn update_of_unknown_path_fails() {
    let env = TestEnv::new();
    env.write_manifest(&fixture_manifest());
    let err = env.fail_json(&["update", "github.com/nobody/here"]);
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains("does not exist"));
    assert!(!env.vendor(".vendr.lock").exists());
}

#[test]
fn tag_and_revision_are_mutually_exclusive() {
    let env = TestEnv::new();
    env.cmd()
        .args(["fetch", "github.com/a/b", "--tag", "v1", "--revision", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn fetch_from_local_repositories_vendors_the_import_graph() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let env = TestEnv::new();
    let lib = env.git_repo(
        "lib",
        &[
            (
                "lib.go",
                "package lib\n\nimport (\n\t\"fmt\"\n\t\"example.com/util/strs\"\n)\n",
            ),
            ("lib_test.go", "package lib\n\nimport \"example.com/testonly\"\n"),
            ("LICENSE", "MIT License\n"),
            ("testdata/input.txt", "fixture\n"),
        ],
    );
    let util = env.git_repo(
        "util",
        &[
            ("strs/strs.go", "package strs\n\nimport \"strings\"\n"),
            ("COPYING", "BSD\n"),
        ],
    );
    env.mirror(&[("example.com/lib", &lib), ("example.com/util", &util)]);

    let fetch = env.run_json(&["fetch", "example.com/lib"]);
    assert_eq!(fetch["ok"], true);
    let events = fetch["data"]["events"].as_array().unwrap();
    let fetched: Vec<&str> = events
        .iter()
        .filter(|e| e["status"] == "fetched")
        .map(|e| e["importpath"].as_str().unwrap())
        .collect();
    assert_eq!(fetched, vec!["example.com/lib", "example.com/util/strs"]);

    assert!(env.vendor("example.com/lib/lib.go").exists());
    assert!(env.vendor("example.com/lib/LICENSE").exists());
    assert!(!env.vendor("example.com/lib/lib_test.go").exists());
    assert!(!env.vendor("example.com/lib/testdata").exists());
    assert!(env.vendor("example.com/util/strs/strs.go").exists());
    assert!(env.vendor("example.com/util/COPYING").exists());
    assert!(!env.vendor(".vendr.lock").exists());

    let manifest = env.read_manifest();
    let deps = manifest["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 2);
    assert_eq!(deps[0]["importpath"], "example.com/lib");
    assert_eq!(deps[0]["vcs"], "git");
    assert_eq!(deps[0]["branch"], "master");
    assert_eq!(deps[0]["revision"], git(&lib, &["rev-parse", "HEAD"]));
    assert_eq!(deps[0]["notests"], true);
    assert_eq!(deps[1]["importpath"], "example.com/util/strs");
    assert_eq!(deps[1]["path"], "strs");

    let again = env.fail_json(&["fetch", "example.com/lib"]);
    assert_eq!(again["error"]["code"], "ALREADY_VENDORED");

    fs::remove_dir_all(env.vendor("example.com")).unwrap();
    let restore = env.run_json(&["restore"]);
    assert_eq!(restore["data"].as_array().unwrap().len(), 2);
    assert!(env.vendor("example.com/lib/lib.go").exists());
    assert!(env.vendor("example.com/util/strs/strs.go").exists());
}

#[test]
fn fix_replays_ledger_entries_once_they_resolve() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let env = TestEnv::new();
    let tool = env.git_repo("tool", &[("tool.go", "package tool\n")]);
    common::write_file(&env.vendor("failed-fetches"), "example.com/tool\n");
    env.mirror(&[("example.com/tool", &tool)]);

    let fix = env.run_json(&["fix"]);
    assert_eq!(fix["data"]["requested"][0], "example.com/tool");
    assert!(!env.vendor("failed-fetches").exists());
    assert!(env.vendor("example.com/tool/tool.go").exists());

    let list = env.run_json(&["list"]);
    assert_eq!(list["data"][0]["importpath"], "example.com/tool");
}

#[test]
fn fetch_evicts_vendored_subpackages_of_the_requested_path() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let env = TestEnv::new();
    let kit = env.git_repo(
        "kit",
        &[("log/log.go", "package log\n"), ("kit.go", "package kit\n")],
    );
    env.mirror(&[("example.com/kit", &kit)]);
    env.write_manifest(&serde_json::json!({
        "version": 0,
        "dependencies": [dependency("example.com/kit/log", "0000000000000000000000000000000000000000")]
    }));
    common::write_file(&env.vendor("example.com/kit/log/stale.go"), "package log");

    env.run_json(&["fetch", "example.com/kit", "--no-recurse"]);

    let manifest = env.read_manifest();
    let deps = manifest["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0]["importpath"], "example.com/kit");
    assert!(!env.vendor("example.com/kit/log/stale.go").exists());
    assert!(env.vendor("example.com/kit/log/log.go").exists());
}

#[test]
fn update_moves_a_dependency_to_its_branch_tip() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let env = TestEnv::new();
    let lib = env.git_repo("lib", &[("lib.go", "package lib\n")]);
    env.mirror(&[("example.com/lib", &lib)]);
    env.run_json(&["fetch", "example.com/lib"]);
    let first = git(&lib, &["rev-parse", "HEAD"]);

    common::write_file(&lib.join("extra.go"), "package lib\n");
    git(&lib, &["add", "-A"]);
    git(&lib, &["commit", "-q", "-m", "second"]);
    let second = git(&lib, &["rev-parse", "HEAD"]);

    let update = env.run_json(&["update", "example.com/lib"]);
    assert_eq!(update["data"][0]["importpath"], "example.com/lib");
    assert_eq!(update["data"][0]["status"], "updated");
    assert_eq!(
        update["data"][0]["detail"],
        format!("{} -> {}", first, second)
    );
    assert!(env.vendor("example.com/lib/extra.go").exists());

    let manifest = env.read_manifest();
    assert_eq!(manifest["dependencies"][0]["revision"], second);
    assert_eq!(manifest["dependencies"][0]["branch"], "master");

    let again = env.run_json(&["update", "--all"]);
    assert_eq!(again["data"][0]["status"], "unchanged");
}

#[test]
fn init_fetches_project_imports_that_are_not_yet_available() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }
    let env = TestEnv::new();
    let tool = env.git_repo("tool", &[("tool.go", "package tool\n")]);
    env.mirror(&[("example.com/tool", &tool)]);
    env.write_project_file(
        "main.go",
        "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/tool\"\n\t\"example.com/have/pkg\"\n\t\"example.com/gopath/pkg\"\n\t\"example.com/listed\"\n)\n",
    );
    env.write_manifest(&serde_json::json!({
        "version": 0,
        "dependencies": [dependency("example.com/listed", "4444444444444444444444444444444444444444")]
    }));
    common::write_file(&env.vendor("example.com/have/pkg/pkg.go"), "package pkg\n");
    let gopath = env.home.join("go");
    common::write_file(&gopath.join("src/example.com/gopath/pkg/pkg.go"), "package pkg\n");

    let out = env
        .cmd()
        .env("GOPATH", &gopath)
        .args(["--json", "init"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let init: serde_json::Value = serde_json::from_slice(&out).unwrap();

    let requested: Vec<&str> = init["data"]["requested"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap())
        .collect();
    assert_eq!(requested, vec!["example.com/listed", "example.com/tool"]);

    let events = init["data"]["events"].as_array().unwrap();
    let status = |path: &str| {
        events
            .iter()
            .find(|e| e["importpath"] == path)
            .map(|e| e["status"].as_str().unwrap().to_string())
    };
    assert_eq!(status("example.com/tool").as_deref(), Some("fetched"));
    assert_eq!(status("example.com/listed").as_deref(), Some("skipped"));
    assert_eq!(status("example.com/have/pkg"), None);
    assert_eq!(status("example.com/gopath/pkg"), None);
    assert_eq!(status("fmt"), None);

    assert!(env.vendor("example.com/tool/tool.go").exists());
    let manifest = env.read_manifest();
    let paths: Vec<&str> = manifest["dependencies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["importpath"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["example.com/listed", "example.com/tool"]);
}
