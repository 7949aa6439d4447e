use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Time budgets for external work
// =============================================================================

/// Budget for a remote ref listing (repository probe)
pub const REMOTE_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for cloning a repository into the cache
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Budget for fetching updates into an already-cloned repository
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Budget for git operations that touch only the local object store
pub const LOCAL_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for a `go` toolchain invocation
pub const TOOLCHAIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Base URL of the canonical public module proxy
pub const DEFAULT_UPSTREAM: &str = "https://proxy.golang.org";

/// Returns the default directory for the bare repository cache.
/// Uses $XDG_DATA_HOME/modprox/cache if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/modprox/cache,
/// or ./modprox/cache if neither is available.
pub fn cache_dir() -> PathBuf {
    cache_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

fn cache_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("modprox").join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_with_env_uses_xdg_data_home_when_set() {
        let path = cache_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/modprox/cache"));
    }

    #[test]
    fn cache_dir_with_env_falls_back_to_home_local_share() {
        let path = cache_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/modprox/cache"));
    }

    #[test]
    fn cache_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = cache_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./modprox/cache"));
    }
}
