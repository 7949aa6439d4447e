//! Base-path index of cached bare repositories
//!
//! Each entry owns one bare mirror under `<cache_dir>/<base_path>` and an
//! async mutex that serializes fetch/resolve/extract work on it. A clone
//! happens at most once per base path per process: the cloning task
//! inserts the entry with the mutex already held, so every concurrent
//! discoverer blocks on it instead of cloning again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::backend::git::cli::GitCli;
use crate::backend::git::Origin;
use crate::backend::BackendError;

/// State of one cached repository; `Cloned` means the mirror on disk is
/// complete and usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Vacant,
    Cloned,
}

pub struct RepoEntry {
    base: String,
    dir: PathBuf,
    state: tokio::sync::Mutex<RepoState>,
}

impl RepoEntry {
    /// The module-path prefix this repository serves.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The on-disk location of the bare mirror.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enters the repository's critical section. Fetch, resolve and
    /// extract must all happen under this guard.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, RepoState> {
        self.state.lock().await
    }
}

pub struct RepoCache {
    root: PathBuf,
    index: Mutex<HashMap<String, Arc<RepoEntry>>>,
}

impl RepoCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds the entry whose base path is the longest prefix of `path`.
    pub fn lookup(&self, path: &str) -> Option<Arc<RepoEntry>> {
        let index = self.index.lock().unwrap();
        for candidate in candidates(path) {
            if let Some(entry) = index.get(candidate) {
                return Some(entry.clone());
            }
        }
        None
    }

    /// Returns the repository hosting `path`, cloning it first if no
    /// cached entry covers the path.
    pub async fn find_or_clone(
        &self,
        path: &str,
        origin: &Origin,
        cli: &GitCli,
    ) -> Result<Arc<RepoEntry>, BackendError> {
        if let Some(entry) = self.lookup(path) {
            debug!(module = path, base = entry.base(), "repository cache hit");
            return Ok(entry);
        }

        // Probe candidate bases from the module path upward; the first
        // one a remote listing succeeds for hosts the module.
        let mut base = None;
        for candidate in candidates(path) {
            let Ok(url) = origin.url(candidate) else {
                continue;
            };
            match cli.ls_remote(&url).await {
                Ok(_) => {
                    base = Some(candidate);
                    break;
                }
                Err(err) => {
                    debug!(candidate, error = %err, "remote probe failed");
                }
            }
        }
        let Some(base) = base else {
            warn!(module = path, "no hosting repository found");
            return Err(BackendError::NotFound);
        };

        let entry = Arc::new(RepoEntry {
            base: base.to_string(),
            dir: self.root.join(base),
            state: tokio::sync::Mutex::new(RepoState::Vacant),
        });

        // Hold the entry's mutex before publishing it, so anyone who finds
        // the placeholder blocks until the clone finished.
        let mut guard = entry.state.lock().await;
        {
            let mut index = self.index.lock().unwrap();
            if let Some(existing) = index.get(base) {
                // Lost the race; wait on the winner's entry instead.
                return Ok(existing.clone());
            }
            index.insert(base.to_string(), entry.clone());
        }
        let reservation = Reservation {
            cache: self,
            base,
            dir: entry.dir.clone(),
            committed: false,
        };

        let url = origin.url(base)?;
        cli.clone_mirror(&url, &entry.dir).await.map_err(|err| {
            warn!(base, error = %err, "failed to clone repository");
            err
        })?;

        *guard = RepoState::Cloned;
        reservation.commit();
        drop(guard);
        info!(base, dir = %entry.dir.display(), "cloned repository");
        Ok(entry)
    }

    /// Registers an already-cloned repository, used when rebuilding the
    /// index from disk.
    fn restore(&self, base: String, dir: PathBuf) {
        let entry = Arc::new(RepoEntry {
            base: base.clone(),
            dir,
            state: tokio::sync::Mutex::new(RepoState::Cloned),
        });
        self.index.lock().unwrap().insert(base, entry);
    }

    /// Rebuilds the index from the cache directory. Every directory that
    /// validates as a bare repository is registered under its relative
    /// path; anything else is descended into.
    pub async fn load(&self, cli: &GitCli) -> std::io::Result<usize> {
        let mut found = 0;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if dir == self.root => {
                    debug!(dir = %dir.display(), error = %err, "cache directory not readable");
                    return Ok(0);
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping unreadable cache directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if cli.is_bare_repository(&path).await {
                    match relative_base(&self.root, &path) {
                        Some(base) => {
                            debug!(base = %base, dir = %path.display(), "restored cached repository");
                            self.restore(base, path);
                            found += 1;
                        }
                        None => warn!(dir = %path.display(), "cache entry outside cache root"),
                    }
                } else {
                    pending.push(path);
                }
            }
        }

        Ok(found)
    }
}

/// Removes the placeholder again if the clone never completed, so the
/// next request retries instead of finding a dead entry. Dropping the
/// reservation on cancellation has the same effect.
struct Reservation<'a> {
    cache: &'a RepoCache,
    base: &'a str,
    dir: PathBuf,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.cache.index.lock().unwrap().remove(self.base);
            if self.dir.exists() {
                let _ = std::fs::remove_dir_all(&self.dir);
            }
        }
    }
}

/// The module path followed by each of its parent directories, ending at
/// the first path element.
pub(super) fn candidates(path: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(path);
    std::iter::from_fn(move || {
        let current = next?;
        next = current.rfind('/').map(|i| &current[..i]);
        Some(current)
    })
}

fn relative_base(root: &Path, dir: &Path) -> Option<String> {
    let rel = dir.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
