//! Version backends
//!
//! A backend answers the five module-proxy questions for a module path:
//! list, latest, info, mod, zip. Implementations resolve them against
//! different sources and are composed by [`multi::MultiBackend`].
//!
//! # Modules
//!
//! - [`git`]: clones upstream repositories into a local bare-mirror cache
//! - [`proxy`]: read-through client of the canonical public module proxy
//! - [`gitlab`]: mirrored git-hosting REST backend
//! - [`toolchain`]: auxiliary backend shelling out to the `go` binary
//! - [`multi`]: per-operation composition of several backends

pub mod git;
pub mod gitlab;
pub mod multi;
pub mod proxy;
pub mod toolchain;

#[cfg(test)]
use mockall::automock;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::backend::git::GitError;
use crate::module::PathError;

/// A resolved version and the committer time of its underlying commit.
/// Serializes to the `{"Version": ..., "Time": ...}` wire object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time", serialize_with = "rfc3339_utc")]
    pub time: DateTime<Utc>,
}

fn rfc3339_utc<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("module not found")]
    NotFound,

    #[error("unknown revision, repository may be out of date")]
    OutOfDate,

    #[error("invalid module path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// True for the two failure kinds that compose away in a multi-backend
    /// and map to 404 on the wire.
    pub fn is_absent(&self) -> bool {
        matches!(self, BackendError::NotFound | BackendError::OutOfDate)
    }
}

impl From<GitError> for BackendError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RepositoryNotFound => BackendError::NotFound,
            GitError::UnknownRevision(_) => BackendError::OutOfDate,
            other => BackendError::Transport(other.to_string()),
        }
    }
}

/// A source of module versions and contents.
///
/// `path` arguments to `get_module`, `get_info` and `get_archive` carry
/// the full module path including any major suffix; `get_list` and
/// `get_latest` receive the prefix and the raw major suffix separately.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// All known versions for the module, canonicalized and deduplicated.
    async fn get_list(&self, path: &str, major: &str) -> Result<Vec<String>, BackendError>;

    /// The most recently committed version for the module.
    async fn get_latest(&self, path: &str, major: &str) -> Result<Info, BackendError>;

    /// The go.mod contents for a version, possibly synthesized.
    async fn get_module(&self, path: &str, version: &str) -> Result<String, BackendError>;

    /// The canonical version and commit time for a version.
    async fn get_info(&self, path: &str, version: &str) -> Result<Info, BackendError>;

    /// The module zip for a version, fully built in memory.
    async fn get_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, BackendError>;
}
