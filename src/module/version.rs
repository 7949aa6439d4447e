//! Canonical versions, path majors, and pseudo-versions

use chrono::{DateTime, Utc};

use crate::module::PathError;

/// Normalizes a version tag to its canonical semver form.
///
/// Partial versions are padded (`v1.0` -> `v1.0.0`), prerelease parts are
/// preserved, and build metadata is dropped except for the literal
/// `+incompatible` tail. Returns `None` for tags that are not versions.
pub fn canonical_version(version: &str) -> Option<String> {
    let rest = version.strip_prefix('v')?;

    let (rest, build) = match rest.split_once('+') {
        Some((core, build)) => (core, Some(build)),
        None => (rest, None),
    };
    let (numbers, prerelease) = match rest.split_once('-') {
        Some((numbers, pre)) => (numbers, Some(pre)),
        None => (rest, None),
    };

    // Pad partial versions before handing them to the semver parser.
    let parts: Vec<&str> = numbers.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => numbers.to_string(),
    };

    let candidate = match prerelease {
        Some(pre) => format!("{padded}-{pre}"),
        None => padded,
    };
    let parsed = semver::Version::parse(&candidate).ok()?;

    let mut canonical = format!("v{parsed}");
    if build == Some("incompatible") {
        canonical.push_str("+incompatible");
    }
    Some(canonical)
}

/// Checks that a version is acceptable for a module with the given raw
/// major suffix (`""`, `"/v2"`, `".v2"`).
///
/// Pseudo-versions are accepted for any major. With no suffix the version
/// must be `v0`/`v1` or carry the `+incompatible` tail; with a suffix the
/// semver major must match it.
pub fn check_path_major(version: &str, major: &str) -> bool {
    if is_pseudo_version(version) {
        return true;
    }

    let Some(found) = semver_major(version) else {
        return false;
    };

    if major.is_empty() {
        return found == "v0" || found == "v1" || version.ends_with("+incompatible");
    }
    found == major.trim_start_matches(['/', '.'])
}

/// The `vN` major of a version string, without parsing the rest of it.
fn semver_major(version: &str) -> Option<&str> {
    let rest = version.strip_prefix('v')?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    match rest[end..].chars().next() {
        None | Some('.') | Some('-') | Some('+') => Some(&version[..end + 1]),
        _ => None,
    }
}

/// Reports whether a version is a pseudo-version: a semver-shaped string
/// whose prerelease tail is `<yyyymmddhhmmss>-<12 hex>`.
pub fn is_pseudo_version(version: &str) -> bool {
    pseudo_parts(version).is_some()
}

/// Extracts the 12-character commit revision from a pseudo-version.
pub fn pseudo_version_rev(version: &str) -> Result<String, PathError> {
    pseudo_parts(version)
        .map(|(_, rev)| rev.to_string())
        .ok_or_else(|| PathError::InvalidVersion(version.to_string()))
}

/// Synthesizes the `v0.0.0-<timestamp>-<12 hex>` pseudo-version for a
/// commit with no semver tag.
pub fn pseudo_version(time: DateTime<Utc>, commit: &str) -> String {
    let rev = if commit.len() > 12 {
        &commit[..12]
    } else {
        commit
    };
    format!("v0.0.0-{}-{}", time.format("%Y%m%d%H%M%S"), rev)
}

fn pseudo_parts(version: &str) -> Option<(&str, &str)> {
    let core = version.split_once('+').map_or(version, |(core, _)| core);
    if !core.starts_with('v') {
        return None;
    }

    // All three pseudo-version shapes end in "-<timestamp>-<rev>".
    let mut segments = core.rsplitn(3, '-');
    let rev = segments.next()?;
    let stamp = segments.next()?;
    segments.next()?;

    if stamp.len() != 14 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if rev.len() != 12
        || !rev
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    Some((stamp, rev))
}
