//! Auxiliary backend over the local Go toolchain
//!
//! Answers the proxy operations by shelling out to the `go` binary with
//! `GOPROXY=direct`, so resolution happens through the toolchain's own
//! version-control support in a private module cache.

use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{Backend, BackendError, Info};
use crate::config::TOOLCHAIN_TIMEOUT;

/// The JSON shape shared by `go list -m -json` and `go mod download -json`.
#[derive(Debug, Deserialize)]
struct ModuleJson {
    #[serde(rename = "Version")]
    version: Option<String>,
    #[serde(rename = "Time")]
    time: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "GoMod")]
    go_mod: Option<PathBuf>,
    #[serde(rename = "Zip")]
    zip: Option<PathBuf>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

pub struct GoToolchain {
    work_dir: PathBuf,
}

impl GoToolchain {
    /// Creates a toolchain backend working inside `work_dir`; a stub
    /// module is materialized there so `go list -m` has a module context.
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    async fn run_go(&self, args: &[&str]) -> Result<Vec<u8>, BackendError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|err| BackendError::Internal(err.to_string()))?;
        let stub = self.work_dir.join("go.mod");
        if !stub.exists() {
            tokio::fs::write(&stub, "module modprox.invalid/toolchain\n\ngo 1.21\n")
                .await
                .map_err(|err| BackendError::Internal(err.to_string()))?;
        }

        let child = Command::new("go")
            .args(args)
            .current_dir(&self.work_dir)
            .env("GOPROXY", "direct")
            .env("GOSUMDB", "off")
            .env("GOFLAGS", "-mod=mod")
            .env("GOPATH", self.work_dir.join("gopath"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| BackendError::Transport(format!("failed to spawn go: {err}")))?;

        let output = tokio::time::timeout(TOOLCHAIN_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                BackendError::Transport(format!(
                    "go {} timed out after {}s",
                    args.join(" "),
                    TOOLCHAIN_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(args = %args.join(" "), stderr = %stderr, "go invocation failed");
        Err(classify_failure(&stderr))
    }

    async fn download(&self, path: &str, version: &str) -> Result<ModuleJson, BackendError> {
        let spec = format!("{path}@{version}");
        let stdout = self
            .run_go(&["mod", "download", "-json", &spec])
            .await?;
        parse_module_json(&stdout)
    }
}

fn classify_failure(stderr: &str) -> BackendError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("unknown revision") || lowered.contains("invalid version") {
        return BackendError::OutOfDate;
    }
    if lowered.contains("not found")
        || lowered.contains("no matching versions")
        || lowered.contains("malformed module path")
    {
        return BackendError::NotFound;
    }
    BackendError::Transport(stderr.to_string())
}

fn parse_module_json(stdout: &[u8]) -> Result<ModuleJson, BackendError> {
    let parsed: ModuleJson = serde_json::from_slice(stdout)
        .map_err(|err| BackendError::Internal(format!("unreadable go output: {err}")))?;
    if let Some(message) = &parsed.error {
        return Err(classify_failure(message));
    }
    Ok(parsed)
}

/// Parses `go list -m -versions` output: the module path followed by its
/// versions on one line.
fn parse_versions_line(stdout: &str) -> Vec<String> {
    stdout
        .split_whitespace()
        .skip(1)
        .map(|version| version.to_string())
        .collect()
}

#[async_trait::async_trait]
impl Backend for GoToolchain {
    async fn get_list(&self, path: &str, major: &str) -> Result<Vec<String>, BackendError> {
        let module = format!("{path}{major}");
        let stdout = self
            .run_go(&["list", "-m", "-versions", &module])
            .await?;
        Ok(parse_versions_line(&String::from_utf8_lossy(&stdout)))
    }

    async fn get_latest(&self, path: &str, major: &str) -> Result<Info, BackendError> {
        let spec = format!("{path}{major}@latest");
        let stdout = self.run_go(&["list", "-m", "-json", &spec]).await?;
        let parsed = parse_module_json(&stdout)?;

        match (parsed.version, parsed.time) {
            (Some(version), Some(time)) => Ok(Info { version, time }),
            _ => Err(BackendError::NotFound),
        }
    }

    async fn get_module(&self, path: &str, version: &str) -> Result<String, BackendError> {
        let parsed = self.download(path, version).await?;
        let Some(go_mod) = parsed.go_mod else {
            return Err(BackendError::NotFound);
        };
        tokio::fs::read_to_string(&go_mod)
            .await
            .map_err(|err| BackendError::Internal(err.to_string()))
    }

    async fn get_info(&self, path: &str, version: &str) -> Result<Info, BackendError> {
        let parsed = self.download(path, version).await?;
        match (parsed.version, parsed.time) {
            (Some(version), Some(time)) => Ok(Info { version, time }),
            _ => Err(BackendError::NotFound),
        }
    }

    async fn get_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, BackendError> {
        let parsed = self.download(path, version).await?;
        let Some(zip) = parsed.zip else {
            return Err(BackendError::NotFound);
        };
        tokio::fs::read(&zip)
            .await
            .map_err(|err| BackendError::Internal(err.to_string()))
    }
}
