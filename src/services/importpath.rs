use url::Url;

/// Parses `raw` as a URL when it carries an explicit `scheme://`. Plain import paths such as
/// `host:port/x` are never treated as URLs.
pub fn parse_url(raw: &str) -> Option<Url> {
    if !raw.contains("://") {
        return None;
    }
    Url::parse(raw.trim()).ok()
}

/// Strips a URL scheme, user-info, query and fragment, leaving `host + path`.
pub fn strip_scheme(raw: &str) -> String {
    let s = raw.trim();
    let Some(url) = parse_url(s) else {
        return s.trim_end_matches('/').to_string();
    };
    let mut out = url.host_str().unwrap_or_default().to_string();
    if let Some(port) = url.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(url.path());
    out.trim_end_matches('/').to_string()
}

/// Returns the import path of the repository root for `path` fetched from `sub_path` inside
/// that repository, or `None` when `path` does not end with `sub_path`.
pub fn repo_root<'a>(path: &'a str, sub_path: &str) -> Option<&'a str> {
    if sub_path.is_empty() {
        return Some(path);
    }
    path.strip_suffix(sub_path)
        .and_then(|p| p.strip_suffix('/'))
        .filter(|p| !p.is_empty())
}

/// Reports whether `parent` is `child` or one of its path-segment ancestors.
pub fn contains(parent: &str, child: &str) -> bool {
    parent == child
        || (child.len() > parent.len()
            && child.starts_with(parent)
            && child.as_bytes()[parent.len()] == b'/')
}

/// Import paths without a dot in their first segment belong to the toolchain's standard
/// distribution and are never vendored.
pub fn is_standard(path: &str) -> bool {
    !path.split('/').next().unwrap_or("").contains('.')
}

pub fn scheme(raw: &str) -> Option<String> {
    parse_url(raw).map(|u| u.scheme().to_string())
}

pub fn indent(level: usize) -> String {
    "·".repeat(level)
}
