//! Drive path handling
//!
//! Drive paths are absolute, `/`-separated strings. The first (empty)
//! component denotes the space root. Normalization collapses repeated
//! slashes and resolves `.` and `..` lexically, never walking above the root.

use crate::error::{Error, Result};

/// Path separator
pub const SEPARATOR: char = '/';

/// Characters the service refuses in entry names
pub const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Characters that turn a segment into a glob pattern
pub const GLOB_META_CHARS: &[char] = &['*', '?', '[', ']'];

/// Lexically normalize a path.
///
/// Returns `/` for the root. Relative input stays relative (the caller decides
/// whether that is acceptable); the empty string normalizes to `.`.
pub fn normalize(path: &str) -> String {
    let rooted = path.starts_with(SEPARATOR);
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Normalize an absolute path and split it into segments below the root.
///
/// `/` yields an empty list. Relative or empty input is an
/// [`Error::InvalidArgument`].
pub fn absolute_segments(path: &str) -> Result<(String, Vec<String>)> {
    if !path.starts_with(SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "path must be absolute: '{path}'"
        )));
    }
    let normalized = normalize(path);
    let segments = normalized
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok((normalized, segments))
}

/// Join a child name onto a parent path
pub fn join(parent: &str, name: &str) -> String {
    let base = parent.trim_end_matches(SEPARATOR);
    format!("{base}/{name}")
}

/// Absolute path made of the first `count` segments
pub fn prefix(segments: &[String], count: usize) -> String {
    if count == 0 {
        return "/".to_string();
    }
    format!("/{}", segments[..count].join("/"))
}

/// Split a normalized absolute path into (parent, name).
///
/// Returns `None` for the root.
pub fn split_parent(path: &str) -> Option<(String, String)> {
    let path = path.trim_end_matches(SEPARATOR);
    let pos = path.rfind(SEPARATOR)?;
    let name = &path[pos + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if pos == 0 { "/" } else { &path[..pos] };
    Some((parent.to_string(), name.to_string()))
}

/// Whether `path` equals `ancestor` or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with(SEPARATOR);
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Whether a segment contains glob metacharacters
pub fn has_glob_meta(segment: &str) -> bool {
    segment.contains(GLOB_META_CHARS)
}

/// Check a name against the service naming rules
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidName(format!("'{name}' is not a valid name")));
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        let forbidden: String = FORBIDDEN_NAME_CHARS.iter().collect();
        return Err(Error::InvalidName(format!(
            "'{name}' must not contain any of {forbidden}"
        )));
    }
    Ok(())
}
