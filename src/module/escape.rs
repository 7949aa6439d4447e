//! Module path and version escaping
//!
//! Proxies receive case-encoded paths: every uppercase letter is written
//! as `!` followed by its lowercase form, so `github.com/Azure` travels
//! as `github.com/!azure`.

use crate::module::PathError;

/// Escapes a module path for use in a proxy URL.
pub fn escape_path(path: &str) -> String {
    escape(path)
}

/// Escapes a version for use in a proxy URL.
pub fn escape_version(version: &str) -> String {
    escape(version)
}

/// Reverses [`escape_path`], rejecting stray `!` and uppercase letters.
pub fn unescape_path(escaped: &str) -> Result<String, PathError> {
    unescape(escaped).ok_or_else(|| PathError::InvalidEscape(escaped.to_string()))
}

/// Reverses [`escape_version`].
pub fn unescape_version(escaped: &str) -> Result<String, PathError> {
    unescape(escaped).ok_or_else(|| PathError::InvalidEscape(escaped.to_string()))
}

fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            result.push('!');
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

fn unescape(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => {
                    result.push(next.to_ascii_uppercase());
                }
                _ => return None,
            },
            c if c.is_ascii_uppercase() => return None,
            c => result.push(c),
        }
    }
    Some(result)
}
