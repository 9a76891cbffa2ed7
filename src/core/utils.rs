//! String-level path helpers shared by the backends.
//!
//! Remote backends (FTP, HTTP) use POSIX separators regardless of the host, so
//! these helpers work on `&str` rather than `std::path::Path`.

use std::path::{Component, Path as HostPath, PathBuf};

use regex::{Regex, RegexBuilder};

use crate::core::{FsError, Result};

/// Returns the final component of a `/`-separated location.
/// A location ending in `/` has an empty name.
pub fn base_name(location: &str) -> &str {
    let start = location.rfind('/').map_or(0, |i| i + 1);
    &location[start..]
}

/// Returns everything before the final component, without trailing separators
/// unless the head consists of separators only (`"/a"` gives `"/"`).
pub fn dir_name(location: &str) -> &str {
    let end = location.rfind('/').map_or(0, |i| i + 1);
    let head = &location[..end];
    if head.chars().any(|c| c != '/') {
        head.trim_end_matches('/')
    } else {
        head
    }
}

/// Splits a name into its stem and extension (including the dot).
/// Leading dots do not start an extension, so `.profile` has none.
pub fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if name[..i].chars().any(|c| c != '.') => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Joins `element` onto `base` with a `/`. An absolute element replaces the base.
pub fn join(base: &str, element: &str) -> String {
    if element.starts_with('/') || base.is_empty() {
        element.to_string()
    } else if base.ends_with('/') {
        format!("{base}{element}")
    } else {
        format!("{base}/{element}")
    }
}

/// Normalizes a host path by removing `.` and resolving `..` lexically.
///
/// # Arguments
///
/// * `path` - The path to normalize.
///
/// # Notes
///
/// Symbolic links are not consulted, so `a/link/..` becomes `a`.
pub fn normalize<P: AsRef<HostPath>>(path: P) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() && !result.has_root() {
                    result.push("..");
                }
            }
            other => result.push(other),
        }
    }
    result
}

/// Splits `host[:port]`, falling back to `default_port` when no port is given.
pub fn split_port(address: &str, default_port: u16) -> Result<(String, u16)> {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| FsError::InvalidPath(address.to_string()))?;
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), default_port)),
    }
}

/// A shell-style name pattern where `*` matches any run of characters.
///
/// Matching is anchored and case-insensitive. `"*"` matches every name.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Option<Regex>,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern == "*" {
            return Ok(Self { regex: None });
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = RegexBuilder::new(&format!("^{body}$"))
            .case_insensitive(true)
            .build()
            .map_err(|_| FsError::InvalidPath(pattern.to_string()))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_none_or(|regex| regex.is_match(name))
    }
}
