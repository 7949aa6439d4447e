use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use modprox::backend::git::{GitAuth, GitBackend, Origin};
use modprox::backend::gitlab::GitLabMirror;
use modprox::backend::multi::MultiBackend;
use modprox::backend::proxy::UpstreamProxy;
use modprox::backend::toolchain::GoToolchain;
use modprox::backend::Backend;
use modprox::{config, server};

#[derive(Parser)]
#[command(name = "ModProx")]
#[command(version, about = "Golang module proxy")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Directory holding the bare repository cache
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Base URL of the upstream module proxy
    #[arg(long, default_value = config::DEFAULT_UPSTREAM)]
    upstream: String,

    /// Username for git over HTTPS
    #[arg(long)]
    git_username: Option<String>,

    /// Password for git over HTTPS
    #[arg(long)]
    git_password: Option<String>,

    /// SSH private key for git remotes
    #[arg(long)]
    git_private_key: Option<PathBuf>,

    /// GitLab instance mirroring upstream repositories; enables the
    /// GitLab backend
    #[arg(long)]
    gitlab_host: Option<String>,

    /// Access token for the GitLab instance
    #[arg(long, default_value = "")]
    gitlab_token: String,

    /// GitLab group the mirrors live under
    #[arg(long, default_value = "mirror")]
    gitlab_group: String,

    /// Also resolve modules through the local Go toolchain
    #[arg(long)]
    toolchain: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modprox=info")),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cache_dir = cli.cache_dir.unwrap_or_else(config::cache_dir);
    std::fs::create_dir_all(&cache_dir)?;

    let auth = GitAuth {
        username: cli.git_username,
        password: cli.git_password,
        private_key: cli.git_private_key,
    };
    let git = GitBackend::new(cache_dir.clone(), Origin::new("https://").with_auth(auth));
    if let Err(err) = git.load().await {
        warn!(error = %err, "failed to load repository cache");
    }

    let mut backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(git),
        Arc::new(UpstreamProxy::new(&cli.upstream)),
    ];
    if let Some(host) = &cli.gitlab_host {
        backends.push(Arc::new(GitLabMirror::new(
            host,
            &cli.gitlab_token,
            &cli.gitlab_group,
        )));
    }
    if cli.toolchain {
        backends.push(Arc::new(GoToolchain::new(cache_dir.join("toolchain"))));
    }

    let backend = Arc::new(MultiBackend::new(backends));
    server::serve(cli.listen, backend).await?;
    Ok(())
}
