//! The five module-proxy routes
//!
//! `/<module>/@v/list`, `/<module>/@latest`, `/<module>/@v/<ver>.info`,
//! `.mod` and `.zip`, with module paths and versions case-escaped per
//! the proxy convention. Failures map to 400 for malformed requests,
//! 404 for not-found / out-of-date, and 500 for everything else.

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use tracing::{debug, error};

use crate::backend::BackendError;
use crate::module::{check_path, split_path_version, unescape_path, unescape_version, PathError};
use crate::server::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    List,
    Latest,
    Info,
    Mod,
    Zip,
}

/// One parsed proxy URI, still in escaped form.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Route<'a> {
    pub operation: Operation,
    pub module: &'a str,
    pub version: Option<&'a str>,
}

/// Splits a request path into module, operation and version. Returns
/// `None` for anything that is not a proxy URI.
pub(crate) fn parse_route(path: &str) -> Option<Route<'_>> {
    let path = path.strip_prefix('/').unwrap_or(path);

    if let Some(module) = path.strip_suffix("/@latest") {
        if module.is_empty() {
            return None;
        }
        return Some(Route {
            operation: Operation::Latest,
            module,
            version: None,
        });
    }

    let (module, rest) = path.split_once("/@v/")?;
    if module.is_empty() || rest.is_empty() {
        return None;
    }

    if rest == "list" {
        return Some(Route {
            operation: Operation::List,
            module,
            version: None,
        });
    }

    let (version, operation) = if let Some(version) = rest.strip_suffix(".info") {
        (version, Operation::Info)
    } else if let Some(version) = rest.strip_suffix(".mod") {
        (version, Operation::Mod)
    } else if let Some(version) = rest.strip_suffix(".zip") {
        (version, Operation::Zip)
    } else {
        return None;
    };
    if version.is_empty() {
        return None;
    }

    Some(Route {
        operation,
        module,
        version: Some(version),
    })
}

pub(crate) async fn dispatch(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(route) = parse_route(uri.path()) else {
        debug!(path = uri.path(), "unrecognized request path");
        return (StatusCode::NOT_FOUND, "not found\n").into_response();
    };

    let module = match unescape_path(route.module) {
        Ok(module) => module,
        Err(err) => return bad_request(err),
    };
    if let Err(err) = check_path(&module) {
        return bad_request(err);
    }

    let version = match route.version.map(unescape_version).transpose() {
        Ok(version) => version,
        Err(err) => return bad_request(err),
    };
    if let Some(version) = &version {
        if !version.starts_with('v') {
            return bad_request(PathError::InvalidVersion(version.clone()));
        }
    }

    match route.operation {
        Operation::List => {
            let (prefix, major) = split_path_version(&module);
            match state.backend.get_list(prefix, major).await {
                Ok(versions) => {
                    state.status.clear(&module, None);
                    let mut body = versions.join("\n");
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    ([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
                }
                Err(err) => failure(&state, &module, None, err),
            }
        }
        Operation::Latest => {
            let (prefix, major) = split_path_version(&module);
            match state.backend.get_latest(prefix, major).await {
                Ok(info) => {
                    state.status.clear(&module, None);
                    Json(info).into_response()
                }
                Err(err) => failure(&state, &module, None, err),
            }
        }
        Operation::Info => {
            let version = version.unwrap_or_default();
            match state.backend.get_info(&module, &version).await {
                Ok(info) => {
                    state.status.clear(&module, Some(&version));
                    Json(info).into_response()
                }
                Err(err) => failure(&state, &module, Some(&version), err),
            }
        }
        Operation::Mod => {
            let version = version.unwrap_or_default();
            match state.backend.get_module(&module, &version).await {
                Ok(contents) => {
                    state.status.clear(&module, Some(&version));
                    ([(header::CONTENT_TYPE, TEXT_PLAIN)], contents).into_response()
                }
                Err(err) => failure(&state, &module, Some(&version), err),
            }
        }
        Operation::Zip => {
            let version = version.unwrap_or_default();
            match state.backend.get_archive(&module, &version).await {
                Ok(archive) => {
                    state.status.clear(&module, Some(&version));
                    ([(header::CONTENT_TYPE, "application/zip")], archive).into_response()
                }
                Err(err) => failure(&state, &module, Some(&version), err),
            }
        }
    }
}

fn bad_request(err: PathError) -> Response {
    (StatusCode::BAD_REQUEST, format!("{err}\n")).into_response()
}

fn failure(
    state: &AppState,
    module: &str,
    version: Option<&str>,
    err: BackendError,
) -> Response {
    match err {
        BackendError::NotFound => {
            state.status.mark_missing(module);
            (StatusCode::NOT_FOUND, "not found\n").into_response()
        }
        BackendError::OutOfDate => {
            state
                .status
                .mark_out_of_date(module, version.unwrap_or_default());
            (StatusCode::NOT_FOUND, "not found: unknown revision\n").into_response()
        }
        BackendError::InvalidPath(_) | BackendError::BadRequest(_) => {
            (StatusCode::BAD_REQUEST, format!("{err}\n")).into_response()
        }
        other => {
            error!(module, error = %other, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{other}\n")).into_response()
        }
    }
}
