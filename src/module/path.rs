//! Module path syntax and major-version suffix splitting

use crate::module::PathError;

/// Validates the syntax of a module path.
///
/// A path is a sequence of non-empty slash-separated elements drawn from a
/// restricted character set; the first element must look like a host name
/// (it contains a dot). This is a syntax check only, it says nothing about
/// whether the path resolves to a repository.
pub fn check_path(path: &str) -> Result<(), PathError> {
    let fail = |reason: &str| {
        Err(PathError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };

    if path.is_empty() {
        return fail("empty path");
    }
    if !path.is_ascii() {
        return fail("non-ASCII character");
    }
    if path.starts_with('/') || path.ends_with('/') {
        return fail("leading or trailing slash");
    }
    if path.contains("//") {
        return fail("double slash");
    }

    let first = path.split('/').next().unwrap_or_default();
    if !first.contains('.') {
        return fail("missing dot in first path element");
    }
    if first.starts_with('-') {
        return fail("leading dash in first path element");
    }

    for element in path.split('/') {
        if element == "." || element == ".." {
            return fail("relative path element");
        }
        if element.starts_with('.') || element.ends_with('.') {
            return fail("leading or trailing dot in path element");
        }
        for c in element.chars() {
            if !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')) {
                return fail("disallowed character in path element");
            }
        }
    }

    Ok(())
}

/// Splits a module path into its prefix and raw major-version suffix.
///
/// The suffix is a trailing `/vN` component for `N >= 2`, or a `.vN` tail
/// inside `gopkg.in/*` paths. `v0` and `v1` never carry a suffix, so paths
/// ending in `/v0` or `/v1` are returned whole. The major is returned in
/// raw form (`""`, `"/v2"`, `".v2"`).
pub fn split_path_version(path: &str) -> (&str, &str) {
    if path.starts_with("gopkg.in/") {
        return split_gopkg_in(path);
    }

    if let Some(i) = path.rfind('/') {
        let tail = &path[i + 1..];
        if is_major_component(tail) {
            return (&path[..i], &path[i..]);
        }
    }

    (path, "")
}

/// True for `vN` with `N >= 2` and no leading zero.
fn is_major_component(tail: &str) -> bool {
    let Some(digits) = tail.strip_prefix('v') else {
        return false;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.starts_with('0') {
        return false;
    }
    digits != "1"
}

fn split_gopkg_in(path: &str) -> (&str, &str) {
    let bytes = path.as_bytes();
    let mut i = path.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i >= 2 && i < path.len() && bytes[i - 1] == b'v' && bytes[i - 2] == b'.' {
        (&path[..i - 2], &path[i - 2..])
    } else {
        (path, "")
    }
}

/// The part of a module prefix below the repository base path.
/// Empty when the module lives at the repository root.
pub fn split_submodule<'a>(path: &'a str, base: &str) -> &'a str {
    path.strip_prefix(base)
        .map(|rest| rest.strip_prefix('/').unwrap_or(rest))
        .unwrap_or(path)
}
