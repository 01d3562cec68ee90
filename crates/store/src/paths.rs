// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Absolute-path helpers for '/'-separated store keys.

/// Join a base path and a relative key. A trailing-slash base or an empty
/// key never produces doubled separators.
pub fn join(base: &str, key: &str) -> String {
    let base = base.trim_end_matches('/');
    let key = key.trim_matches('/');
    if key.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else if base.is_empty() {
        format!("/{}", key)
    } else {
        format!("{}/{}", base, key)
    }
}

/// Parent of an absolute path; `None` at the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Final path segment.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Strip `root` from `abs`, yielding the root-relative key ("" for the
/// root itself). `None` when `abs` is outside the root.
pub fn relative<'a>(root: &str, abs: &'a str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    if abs == root || (root.is_empty() && abs == "/") {
        return Some("");
    }
    abs.strip_prefix(root)?.strip_prefix('/')
}

/// Every proper ancestor of `path` below (and excluding) `stop`, nearest
/// first. Used for empty-parent cleanup walks.
pub fn ancestors_below<'a>(path: &'a str, stop: &str) -> Vec<&'a str> {
    let stop = stop.trim_end_matches('/');
    let mut out = Vec::new();
    let mut current = path;
    while let Some(p) = parent(current) {
        if p == stop || p == "/" {
            break;
        }
        out.push(p);
        current = p;
    }
    out
}
