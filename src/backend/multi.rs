//! Composition of several backends with per-operation policies

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, Info};

/// Fans a request out over its backends.
///
/// `get_list` unions every successful result, `get_latest` keeps the
/// winner with the greatest commit time, and the content operations take
/// the first success in construction order. A backend that cannot serve
/// the module simply drops out of the composition.
pub struct MultiBackend {
    backends: Vec<Arc<dyn Backend>>,
}

impl MultiBackend {
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        Self { backends }
    }
}

fn note_failure(op: &str, path: &str, err: &BackendError) {
    if err.is_absent() {
        debug!(op, module = path, "backend had no answer");
    } else {
        warn!(op, module = path, error = %err, "backend failed");
    }
}

#[async_trait::async_trait]
impl Backend for MultiBackend {
    async fn get_list(&self, path: &str, major: &str) -> Result<Vec<String>, BackendError> {
        let mut versions = BTreeSet::new();
        let mut answered = false;
        for backend in &self.backends {
            match backend.get_list(path, major).await {
                Ok(found) => {
                    answered = true;
                    versions.extend(found);
                }
                Err(err) => note_failure("list", path, &err),
            }
        }

        if !answered {
            return Err(BackendError::NotFound);
        }
        Ok(versions.into_iter().collect())
    }

    async fn get_latest(&self, path: &str, major: &str) -> Result<Info, BackendError> {
        let mut latest: Option<Info> = None;
        for backend in &self.backends {
            match backend.get_latest(path, major).await {
                Ok(info) => {
                    if latest.as_ref().is_none_or(|best| best.time < info.time) {
                        latest = Some(info);
                    }
                }
                Err(err) => note_failure("latest", path, &err),
            }
        }

        latest.ok_or(BackendError::NotFound)
    }

    async fn get_module(&self, path: &str, version: &str) -> Result<String, BackendError> {
        for backend in &self.backends {
            match backend.get_module(path, version).await {
                Ok(contents) => return Ok(contents),
                Err(err) => note_failure("mod", path, &err),
            }
        }
        Err(BackendError::NotFound)
    }

    async fn get_info(&self, path: &str, version: &str) -> Result<Info, BackendError> {
        for backend in &self.backends {
            match backend.get_info(path, version).await {
                Ok(info) => return Ok(info),
                Err(err) => note_failure("info", path, &err),
            }
        }
        Err(BackendError::NotFound)
    }

    async fn get_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, BackendError> {
        for backend in &self.backends {
            match backend.get_archive(path, version).await {
                Ok(archive) => return Ok(archive),
                Err(err) => note_failure("zip", path, &err),
            }
        }
        Err(BackendError::NotFound)
    }
}
