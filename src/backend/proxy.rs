//! Read-through client of the canonical module proxy

use tracing::warn;

use crate::backend::{Backend, BackendError, Info};
use crate::module::{escape_path, escape_version};

/// Backend that forwards every operation to an upstream module proxy.
pub struct UpstreamProxy {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamProxy {
    /// Creates an UpstreamProxy against a custom base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("modprox")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, BackendError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        // The proxy answers 404 or 410 for modules it does not serve.
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(BackendError::NotFound);
        }
        if !status.is_success() {
            warn!("upstream proxy returned status {status}: {url}");
            return Err(BackendError::Transport(format!(
                "unexpected status {status} from upstream proxy"
            )));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Backend for UpstreamProxy {
    async fn get_list(&self, path: &str, major: &str) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/{}{}/@v/list", self.base_url, escape_path(path), major);
        let body = self.get(&url).await?.text().await?;

        Ok(body
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect())
    }

    async fn get_latest(&self, path: &str, major: &str) -> Result<Info, BackendError> {
        let url = format!("{}/{}{}/@latest", self.base_url, escape_path(path), major);
        Ok(self.get(&url).await?.json().await?)
    }

    async fn get_module(&self, path: &str, version: &str) -> Result<String, BackendError> {
        let url = format!(
            "{}/{}/@v/{}.mod",
            self.base_url,
            escape_path(path),
            escape_version(version)
        );
        Ok(self.get(&url).await?.text().await?)
    }

    async fn get_info(&self, path: &str, version: &str) -> Result<Info, BackendError> {
        let url = format!(
            "{}/{}/@v/{}.info",
            self.base_url,
            escape_path(path),
            escape_version(version)
        );
        Ok(self.get(&url).await?.json().await?)
    }

    async fn get_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, BackendError> {
        let url = format!(
            "{}/{}/@v/{}.zip",
            self.base_url,
            escape_path(path),
            escape_version(version)
        );
        Ok(self.get(&url).await?.bytes().await?.to_vec())
    }
}
