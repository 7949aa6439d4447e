//! Vanity module-path mapping
//!
//! Well-known import paths (`gopkg.in/*`, `golang.org/x/*`, ...) do not
//! name the host that actually serves their git repository. This module
//! rewrites a module path into the host path a clone can be made from and
//! separates the semantic major version.

use crate::module::{check_path, split_path_version, PathError};

/// Fixed prefix rewrites, applied after the `gopkg.in` rule.
/// The first matching entry wins.
const PREFIX_RULES: &[(&str, &str)] = &[
    ("golang.org/x", "github.com/golang"),
    ("golang.org/dl", "github.com/golang/dl"),
    ("google.golang.org/grpc", "github.com/grpc/grpc-go"),
    ("google.golang.org/protobuf", "github.com/protocolbuffers/protobuf-go"),
    ("google.golang.org/api", "github.com/googleapis/google-api-go-client"),
    ("google.golang.org/genproto", "github.com/googleapis/go-genproto"),
    ("google.golang.org/appengine", "github.com/golang/appengine"),
    ("cloud.google.com/go", "github.com/googleapis/google-cloud-go"),
    ("go.opentelemetry.io/proto/otlp", "github.com/open-telemetry/opentelemetry-proto-go"),
    ("go.opentelemetry.io/otel", "github.com/open-telemetry/opentelemetry-go"),
    ("go.uber.org", "github.com/uber-go"),
    ("honnef.co/go/tools", "github.com/dominikh/go-tools"),
    ("sigs.k8s.io", "github.com/kubernetes-sigs"),
    ("k8s.io", "github.com/kubernetes"),
    ("gonum.org/v1/gonum", "github.com/gonum/gonum"),
];

/// Maps a module path to `(host_path, major)`.
///
/// The host path is what `https://` is prepended to when cloning; the
/// major is normalized to a bare `vN` and emptied for `v0`/`v1`.
pub fn map_path(path: &str) -> Result<(String, String), PathError> {
    check_path(path)?;

    let (prefix, major) = split_path_version(path);

    let mapped = if let Some(rest) = prefix.strip_prefix("gopkg.in/") {
        match rest.split('/').count() {
            // gopkg.in/pkg -> github.com/go-pkg/pkg
            1 => format!("github.com/go-{rest}/{rest}"),
            // gopkg.in/user/pkg -> github.com/user/pkg
            2 => format!("github.com/{rest}"),
            _ => {
                return Err(PathError::InvalidPath {
                    path: path.to_string(),
                    reason: "unexpected number of segments in gopkg.in path".to_string(),
                })
            }
        }
    } else {
        rewrite_prefix(prefix)
    };

    let major = major.trim_start_matches(['/', '.']);
    let major = if major == "v0" || major == "v1" {
        ""
    } else {
        major
    };

    Ok((mapped, major.to_string()))
}

fn rewrite_prefix(prefix: &str) -> String {
    for (key, value) in PREFIX_RULES {
        if prefix == *key {
            return value.to_string();
        }
        if let Some(rest) = prefix.strip_prefix(key) {
            if rest.starts_with('/') {
                return format!("{value}{rest}");
            }
        }
    }
    prefix.to_string()
}
