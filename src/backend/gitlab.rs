//! Mirrored git-hosting backend (GitLab REST API)
//!
//! Serves modules out of a GitLab group that mirrors their upstream
//! repositories. Versions come from the tag API, go.mod from the raw
//! file API, and the zip from the commit archive, re-packed into the
//! module zip layout.

use std::io::{Cursor, Read, Write};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::backend::{Backend, BackendError, Info};
use crate::module::{
    canonical_version, check_path_major, is_pseudo_version, pseudo_version_rev,
    split_path_version,
};

#[derive(Debug, Deserialize)]
struct GitLabCommit {
    committed_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitLabTag {
    name: String,
    commit: GitLabCommit,
}

/// Backend over a GitLab instance mirroring upstream repositories under
/// a single group.
pub struct GitLabMirror {
    client: reqwest::Client,
    host: String,
    token: String,
    group: String,
}

impl GitLabMirror {
    pub fn new(host: &str, token: &str, group: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("modprox")
                .build()
                .expect("Failed to create HTTP client"),
            host: host.trim_end_matches('/').to_string(),
            token: token.to_string(),
            group: group.to_string(),
        }
    }

    /// URL-encoded project id of the mirror for a module prefix.
    fn project_id(&self, prefix: &str) -> String {
        format!("{}/{}", self.group, prefix).replace('/', "%2F")
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, BackendError> {
        let mut request = self.client.get(url);
        if !self.token.is_empty() {
            request = request.header("PRIVATE-TOKEN", &self.token);
        }
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound);
        }
        if !status.is_success() {
            warn!("gitlab returned status {status}: {url}");
            return Err(BackendError::Transport(format!(
                "unexpected status {status} from gitlab"
            )));
        }
        Ok(response)
    }

    async fn tags(&self, prefix: &str) -> Result<Vec<GitLabTag>, BackendError> {
        let url = format!(
            "{}/api/v4/projects/{}/repository/tags?per_page=100",
            self.host,
            self.project_id(prefix)
        );
        Ok(self.get(&url).await?.json().await?)
    }

    /// The ref GitLab should resolve for a version: the embedded commit
    /// for pseudo-versions, the version itself otherwise.
    fn reference(version: &str) -> Result<String, BackendError> {
        if is_pseudo_version(version) {
            return Ok(pseudo_version_rev(version)?);
        }
        Ok(version.to_string())
    }
}

#[async_trait::async_trait]
impl Backend for GitLabMirror {
    async fn get_list(&self, path: &str, major: &str) -> Result<Vec<String>, BackendError> {
        let tags = self.tags(path).await?;

        let mut versions: Vec<String> = tags
            .iter()
            .filter(|tag| check_path_major(&tag.name, major))
            .filter_map(|tag| canonical_version(&tag.name))
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    async fn get_latest(&self, path: &str, major: &str) -> Result<Info, BackendError> {
        let tags = self.tags(path).await?;

        tags.into_iter()
            .filter(|tag| check_path_major(&tag.name, major))
            .max_by_key(|tag| tag.commit.committed_date)
            .map(|tag| Info {
                version: tag.name,
                time: tag.commit.committed_date,
            })
            .ok_or(BackendError::NotFound)
    }

    async fn get_module(&self, path: &str, version: &str) -> Result<String, BackendError> {
        let incompatible = version.ends_with("+incompatible");
        let bare_version = version.strip_suffix("+incompatible").unwrap_or(version);
        let (prefix, major) = split_path_version(path);
        if incompatible && !major.is_empty() {
            return Err(BackendError::BadRequest(format!(
                "major version suffix cannot be combined with +incompatible: path='{path}', version='{bare_version}'"
            )));
        }
        let reference = Self::reference(bare_version)?;

        let url = format!(
            "{}/api/v4/projects/{}/repository/files/go.mod/raw?ref={}",
            self.host,
            self.project_id(prefix),
            reference
        );
        match self.get(&url).await {
            Ok(response) => Ok(response.text().await?),
            Err(BackendError::NotFound) if major.is_empty() => {
                // Synthesize the go.mod v0/v1 modules never had.
                Ok(format!("module {prefix}\n"))
            }
            Err(err) => Err(err),
        }
    }

    async fn get_info(&self, path: &str, version: &str) -> Result<Info, BackendError> {
        let incompatible = version.ends_with("+incompatible");
        let bare_version = version.strip_suffix("+incompatible").unwrap_or(version);
        let (prefix, major) = split_path_version(path);
        if incompatible && !major.is_empty() {
            return Err(BackendError::BadRequest(format!(
                "major version suffix cannot be combined with +incompatible: path='{path}', version='{bare_version}'"
            )));
        }
        let reference = Self::reference(bare_version)?;

        let url = format!(
            "{}/api/v4/projects/{}/repository/tags/{}",
            self.host,
            self.project_id(prefix),
            reference
        );
        let tag: GitLabTag = self.get(&url).await?.json().await?;

        let version = if incompatible {
            format!("{bare_version}+incompatible")
        } else {
            bare_version.to_string()
        };
        Ok(Info {
            version,
            time: tag.commit.committed_date,
        })
    }

    async fn get_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, BackendError> {
        let bare_version = version.strip_suffix("+incompatible").unwrap_or(version);
        let (prefix, _) = split_path_version(path);
        let reference = Self::reference(bare_version)?;

        let url = format!(
            "{}/api/v4/projects/{}/repository/archive.zip?sha={}",
            self.host,
            self.project_id(prefix),
            reference
        );
        let payload = self.get(&url).await?.bytes().await?.to_vec();

        repack_archive(&payload, &format!("{path}@{version}"))
            .map_err(|err| BackendError::Internal(format!("failed to re-pack archive: {err}")))
    }
}

/// Rewrites a hosted commit archive into the module zip layout: the
/// hosting-generated top directory becomes `<path>@<version>/` and the
/// nested-module, vendor and symlink rules are applied to the entries.
fn repack_archive(payload: &[u8], zip_prefix: &str) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut input = ZipArchive::new(Cursor::new(payload))?;

    // First pass: find the generated root directory and the nested
    // modules to drop.
    let mut root = None;
    let mut ignored = Vec::new();
    for i in 0..input.len() {
        let name = input.by_index(i)?.name().to_string();
        let Some((top, rest)) = name.split_once('/') else {
            continue;
        };
        if root.is_none() {
            root = Some(format!("{top}/"));
        }
        if let Some(dir) = rest.strip_suffix("/go.mod") {
            ignored.push(format!("{dir}/"));
        }
    }
    let root = root.unwrap_or_default();

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for i in 0..input.len() {
        let mut file = input.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        if is_symlink_entry(file.unix_mode()) {
            continue;
        }
        let Some(rest) = file.name().strip_prefix(root.as_str()) else {
            continue;
        };
        let rest = rest.to_string();
        if ignored.iter().any(|prefix| rest.starts_with(prefix)) {
            continue;
        }
        if rest.starts_with("vendor/") || rest.contains("/vendor/") {
            if !rest.ends_with("vendor/modules.txt") && !rest.ends_with("vendor/vendor.json") {
                continue;
            }
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        writer.start_file(format!("{zip_prefix}/{rest}"), options)?;
        writer.write_all(&data)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Hosted archives carry the git filemode in the entry's unix mode, so
/// symlinks show up as `120000` entries.
fn is_symlink_entry(mode: Option<u32>) -> bool {
    mode.is_some_and(|mode| mode & 0o170000 == 0o120000)
}
