use crate::services::importpath::contains;
use crate::services::materialize::should_skip;
use std::collections::BTreeSet;
use std::path::Path;

pub trait ImportScanner {
    /// Import paths referenced by the sources under `src`. `wc_root` bounds the search for
    /// nested `vendor/` directories and `root_prefix` is the import path of `wc_root`.
    fn scan_imports(
        &self,
        src: &Path,
        wc_root: &Path,
        root_prefix: &str,
        tests: bool,
        all: bool,
    ) -> anyhow::Result<BTreeSet<String>>;
}

pub struct GoImportScanner;

impl ImportScanner for GoImportScanner {
    fn scan_imports(
        &self,
        src: &Path,
        wc_root: &Path,
        root_prefix: &str,
        tests: bool,
        all: bool,
    ) -> anyhow::Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        walk(src, wc_root, root_prefix, tests, all, &mut out)?;
        Ok(out)
    }
}

fn walk(
    dir: &Path,
    wc_root: &Path,
    root_prefix: &str,
    tests: bool,
    all: bool,
    out: &mut BTreeSet<String>,
) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().to_string();
        if ty.is_symlink() {
            continue;
        }
        if ty.is_dir() {
            // Go never builds testdata, even when the directory is copied.
            if name == "testdata" || should_skip(&name, true, tests, all) {
                continue;
            }
            walk(&entry.path(), wc_root, root_prefix, tests, all, out)?;
            continue;
        }
        if !name.ends_with(".go") || should_skip(&name, false, tests, all) {
            continue;
        }
        if !tests && name.ends_with("_test.go") {
            continue;
        }
        let raw = std::fs::read_to_string(entry.path())?;
        for imp in parse_imports(&raw) {
            if imp == "C" || is_explicit_vendor(&imp, root_prefix) {
                continue;
            }
            if bundled_in_vendor(dir, wc_root, &imp) {
                continue;
            }
            out.insert(imp);
        }
    }
    Ok(())
}

fn is_explicit_vendor(imp: &str, root_prefix: &str) -> bool {
    !root_prefix.is_empty()
        && contains(root_prefix, imp)
        && imp.split('/').any(|seg| seg == "vendor")
}

/// Reports whether `imp` resolves to a `vendor/` directory between `dir` and `wc_root`.
fn bundled_in_vendor(dir: &Path, wc_root: &Path, imp: &str) -> bool {
    let mut cur = Some(dir);
    while let Some(d) = cur {
        if !d.starts_with(wc_root) {
            break;
        }
        let candidate = imp
            .split('/')
            .fold(d.join("vendor"), |p, seg| p.join(seg));
        if candidate.is_dir() {
            return true;
        }
        if d == wc_root {
            break;
        }
        cur = d.parent();
    }
    false
}

#[derive(Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Punct(char),
}

fn tokenize(src: &str) -> Vec<Token> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.push(Token::Punct(';'));
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '"' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '"' && chars[i] != '\n' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 1;
                }
                s.push(chars[i]);
                i += 1;
            }
            i += 1;
            out.push(Token::Str(s));
        } else if c == '`' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '`' {
                s.push(chars[i]);
                i += 1;
            }
            i += 1;
            out.push(Token::Str(s));
        } else if c.is_alphanumeric() || c == '_' {
            let mut s = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                s.push(chars[i]);
                i += 1;
            }
            out.push(Token::Ident(s));
        } else if c == '\n' {
            out.push(Token::Punct(';'));
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else {
            out.push(Token::Punct(c));
            i += 1;
        }
    }
    out
}

/// Import paths declared in a Go source file. Parsing stops at the first declaration that is
/// not an import.
pub fn parse_imports(src: &str) -> Vec<String> {
    let tokens: Vec<Token> = tokenize(src)
        .into_iter()
        .filter(|t| *t != Token::Punct(';'))
        .collect();
    let mut out = Vec::new();
    let mut it = tokens.iter().peekable();

    match (it.next(), it.next()) {
        (Some(Token::Ident(kw)), Some(Token::Ident(_))) if kw == "package" => {}
        _ => return out,
    }

    while let Some(Token::Ident(kw)) = it.peek() {
        if kw != "import" {
            break;
        }
        it.next();
        if it.peek() == Some(&&Token::Punct('(')) {
            it.next();
            for t in it.by_ref() {
                match t {
                    Token::Str(s) => out.push(s.clone()),
                    Token::Punct(')') => break,
                    _ => {}
                }
            }
        } else {
            for t in it.by_ref() {
                if let Token::Str(s) = t {
                    out.push(s.clone());
                    break;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{parse_imports, GoImportScanner, ImportScanner};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_single_grouped_and_aliased_imports() {
        let src = r#"// Package x does things.
/* block "not/an/import" */
package x

import "fmt"
import alias "example.com/alias"

import (
	"strings" // trailing
	_ "example.com/side/effect"
	. `example.com/raw`
)

var s = "example.com/not/an/import"

import "example.com/too/late"
"#;
        assert_eq!(
            parse_imports(src),
            vec![
                "fmt",
                "example.com/alias",
                "strings",
                "example.com/side/effect",
                "example.com/raw",
            ]
        );
    }

    #[test]
    fn missing_package_clause_yields_nothing() {
        assert!(parse_imports("import \"fmt\"").is_empty());
    }

    #[test]
    fn scan_skips_tests_vendor_bundled_and_cgo() {
        let tmp = TempDir::new().unwrap();
        let wc = tmp.path().join("wc");
        fs::create_dir_all(wc.join("pkg")).unwrap();
        fs::create_dir_all(wc.join("vendor/example.com/bundled")).unwrap();
        fs::create_dir_all(wc.join("testdata")).unwrap();
        fs::write(
            wc.join("pkg/a.go"),
            "package pkg\nimport (\n\"C\"\n\"example.com/bundled\"\n\"example.com/real\"\n\"example.com/repo/vendor/x.com/y\"\n)\n",
        )
        .unwrap();
        fs::write(
            wc.join("pkg/a_test.go"),
            "package pkg\nimport \"example.com/testonly\"\n",
        )
        .unwrap();
        fs::write(
            wc.join("testdata/t.go"),
            "package t\nimport \"example.com/fixture\"\n",
        )
        .unwrap();

        let found = GoImportScanner
            .scan_imports(&wc.join("pkg"), &wc, "example.com/repo", false, false)
            .unwrap();
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["example.com/real".to_string()]
        );

        let with_tests = GoImportScanner
            .scan_imports(&wc, &wc, "example.com/repo", true, false)
            .unwrap();
        assert!(with_tests.contains("example.com/testonly"));
        assert!(!with_tests.contains("example.com/fixture"));
        assert!(!with_tests.contains("example.com/bundled"));
    }
}
