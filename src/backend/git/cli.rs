//! Thin wrapper over the system `git` binary
//!
//! Every operation runs as a child process with an explicit time budget
//! and with interactive credential prompts disabled, so a missing or
//! private repository fails fast instead of hanging the request.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::{CLONE_TIMEOUT, FETCH_TIMEOUT, LOCAL_GIT_TIMEOUT, REMOTE_LIST_TIMEOUT};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("repository not found")]
    RepositoryNotFound,

    #[error("unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("git {op} timed out after {}s", .budget.as_secs())]
    Timeout { op: String, budget: Duration },

    #[error("git {op} failed: {stderr}")]
    Failed { op: String, stderr: String },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Optional credentials for talking to remotes.
#[derive(Debug, Clone, Default)]
pub struct GitAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
}

/// A ref reported by a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub hash: String,
    pub name: String,
}

impl RemoteRef {
    /// The short tag name, or `None` for branches and peeled entries.
    pub fn tag_name(&self) -> Option<&str> {
        let short = self.name.strip_prefix("refs/tags/")?;
        if short.ends_with("^{}") {
            return None;
        }
        Some(short)
    }
}

/// A tag with the committer time of the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    pub name: String,
    pub time: DateTime<Utc>,
}

/// A file entry from a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: String,
    pub hash: String,
    pub path: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }

    pub fn is_symlink(&self) -> bool {
        self.mode == "120000"
    }
}

#[derive(Debug, Clone)]
pub struct GitCli {
    auth: GitAuth,
}

impl GitCli {
    pub fn new(auth: GitAuth) -> Self {
        Self { auth }
    }

    /// Lists refs advertised by a remote. "No such repository" and
    /// "authentication required" both count as [`GitError::RepositoryNotFound`].
    pub async fn ls_remote(&self, url: &str) -> Result<Vec<RemoteRef>, GitError> {
        let output = self
            .run("ls-remote", &["ls-remote", url], REMOTE_LIST_TIMEOUT)
            .await?;

        let mut refs = Vec::new();
        for line in String::from_utf8_lossy(&output).lines() {
            if let Some((hash, name)) = line.split_once('\t') {
                refs.push(RemoteRef {
                    hash: hash.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(refs)
    }

    /// Clones a repository as a bare mirror, so a later plain fetch
    /// updates every branch and tag in place.
    pub async fn clone_mirror(&self, url: &str, dir: &Path) -> Result<(), GitError> {
        let dir = path_str(dir)?;
        self.run("clone", &["clone", "--mirror", url, dir], CLONE_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Fetches updated refs and tags from origin. Exit status 0 covers
    /// the already-up-to-date case.
    pub async fn fetch(&self, dir: &Path) -> Result<(), GitError> {
        let dir = path_str(dir)?;
        self.run(
            "fetch",
            &["-C", dir, "fetch", "origin", "--tags", "--force", "--prune"],
            FETCH_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Resolves an arbitrary revision spec to an object hash.
    pub async fn rev_parse(&self, dir: &Path, spec: &str) -> Result<String, GitError> {
        let dir = path_str(dir)?;
        let output = self
            .run(
                "rev-parse",
                &["-C", dir, "rev-parse", "--verify", "--quiet", spec],
                LOCAL_GIT_TIMEOUT,
            )
            .await
            .map_err(|err| match err {
                GitError::Failed { .. } => GitError::UnknownRevision(spec.to_string()),
                other => other,
            })?;

        let hash = String::from_utf8_lossy(&output).trim().to_string();
        if hash.is_empty() {
            return Err(GitError::UnknownRevision(spec.to_string()));
        }
        Ok(hash)
    }

    /// Resolves a revision to the commit it names.
    pub async fn rev_parse_commit(&self, dir: &Path, rev: &str) -> Result<String, GitError> {
        self.rev_parse(dir, &format!("{rev}^{{commit}}")).await
    }

    /// The commit currently at HEAD.
    pub async fn head_commit(&self, dir: &Path) -> Result<String, GitError> {
        self.rev_parse_commit(dir, "HEAD").await
    }

    /// Whether a tree-ish spec (e.g. `<commit>:<subdir>`) names a tree.
    pub async fn tree_exists(&self, dir: &Path, spec: &str) -> bool {
        self.rev_parse(dir, &format!("{spec}^{{tree}}")).await.is_ok()
    }

    /// Committer time of a commit, in UTC.
    pub async fn commit_time(&self, dir: &Path, hash: &str) -> Result<DateTime<Utc>, GitError> {
        let dir_str = path_str(dir)?;
        let output = self
            .run(
                "show",
                &["-C", dir_str, "show", "-s", "--format=%cI", hash],
                LOCAL_GIT_TIMEOUT,
            )
            .await?;

        let stamp = String::from_utf8_lossy(&output).trim().to_string();
        parse_commit_time(&stamp).ok_or_else(|| GitError::Failed {
            op: "show".to_string(),
            stderr: format!("unparsable committer date '{stamp}' for {hash}"),
        })
    }

    /// All tags with the committer time of the commit each points at.
    /// Annotated tags are peeled to their target commit.
    pub async fn tags(&self, dir: &Path) -> Result<Vec<TagRef>, GitError> {
        let dir_str = path_str(dir)?;
        let output = self
            .run(
                "for-each-ref",
                &[
                    "-C",
                    dir_str,
                    "for-each-ref",
                    "refs/tags",
                    "--format=%(refname:short)\t%(committerdate:iso-strict)\t%(*committerdate:iso-strict)",
                ],
                LOCAL_GIT_TIMEOUT,
            )
            .await?;

        let mut tags = Vec::new();
        for line in String::from_utf8_lossy(&output).lines() {
            let mut fields = line.split('\t');
            let (Some(name), Some(direct), Some(peeled)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            let stamp = if peeled.is_empty() { direct } else { peeled };
            let Some(time) = parse_commit_time(stamp) else {
                debug!(tag = name, "skipping tag without a committer date");
                continue;
            };
            tags.push(TagRef {
                name: name.to_string(),
                time,
            });
        }
        Ok(tags)
    }

    /// Recursively lists the blobs of a tree-ish, paths relative to it.
    pub async fn ls_tree(&self, dir: &Path, treeish: &str) -> Result<Vec<TreeEntry>, GitError> {
        let dir_str = path_str(dir)?;
        let output = self
            .run(
                "ls-tree",
                &["-C", dir_str, "ls-tree", "-r", treeish],
                LOCAL_GIT_TIMEOUT,
            )
            .await?;

        let mut entries = Vec::new();
        for line in String::from_utf8_lossy(&output).lines() {
            let Some((header, path)) = line.split_once('\t') else {
                continue;
            };
            let mut fields = header.split_ascii_whitespace();
            let (Some(mode), Some(kind), Some(hash)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            entries.push(TreeEntry {
                mode: mode.to_string(),
                kind: kind.to_string(),
                hash: hash.to_string(),
                path: path.to_string(),
            });
        }
        Ok(entries)
    }

    /// Reads a blob's content by hash.
    pub async fn cat_blob(&self, dir: &Path, hash: &str) -> Result<Vec<u8>, GitError> {
        let dir_str = path_str(dir)?;
        self.run(
            "cat-file",
            &["-C", dir_str, "cat-file", "blob", hash],
            LOCAL_GIT_TIMEOUT,
        )
        .await
    }

    /// Whether a directory holds a bare repository. The git dir is pinned
    /// so discovery never walks out of the cache directory.
    pub async fn is_bare_repository(&self, dir: &Path) -> bool {
        let Ok(dir_str) = path_str(dir) else {
            return false;
        };
        match self
            .run(
                "rev-parse",
                &["--git-dir", dir_str, "rev-parse", "--is-bare-repository"],
                LOCAL_GIT_TIMEOUT,
            )
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output).trim() == "true",
            Err(_) => false,
        }
    }

    async fn run(
        &self,
        op: &str,
        args: &[&str],
        budget: Duration,
    ) -> Result<Vec<u8>, GitError> {
        let mut command = Command::new("git");
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(key) = &self.auth.private_key {
            command.env(
                "GIT_SSH_COMMAND",
                format!("ssh -i {} -o IdentitiesOnly=yes", key.display()),
            );
        }

        let child = command.spawn()?;
        let output = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(GitError::Spawn(err)),
            Err(_) => {
                return Err(GitError::Timeout {
                    op: op.to_string(),
                    budget,
                })
            }
        };

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(op, stderr))
    }
}

fn path_str(dir: &Path) -> Result<&str, GitError> {
    dir.to_str().ok_or_else(|| {
        GitError::Spawn(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "non-UTF-8 repository path",
        ))
    })
}

fn classify_failure(op: &str, stderr: String) -> GitError {
    let lowered = stderr.to_lowercase();
    let negative = [
        "not found",
        "could not read username",
        "could not read password",
        "authentication failed",
        "does not appear to be a git repository",
        "no such file or directory",
        "no such device or address",
        "access denied",
    ];
    if negative.iter().any(|needle| lowered.contains(needle)) {
        return GitError::RepositoryNotFound;
    }
    GitError::Failed {
        op: op.to_string(),
        stderr,
    }
}

fn parse_commit_time(stamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}
