//! Relative-path helpers shared by all backends.
//!
//! Relative paths are always `/`-separated with no leading slash; the empty
//! string is the backend root.

/// `dir/name`, or just `name` at the root.
pub fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent of a relative path, `None` when it sits directly under the root.
pub fn parent_rel(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|p| !p.is_empty())
}

pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit_once('/').map_or(trimmed, |(_, name)| name)
}

/// Join a remote root with a relative path, dropping empty and `.` segments.
///
/// A leading `/` on the root is kept; an empty result becomes `.`.
pub fn remote_path(root: &str, rel: &str) -> String {
    let absolute = root.starts_with('/');
    let joined = root
        .split('/')
        .chain(rel.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Split a remote path into (parent, name). A bare name has no parent.
pub fn split_remote(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => (Some("/"), name),
        Some((parent, name)) => (Some(parent), name),
        None => (None, path),
    }
}

/// Every directory from the top of `path` down to `path` itself.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn ancestors(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}
