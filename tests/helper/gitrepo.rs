//! Scratch git repository fixtures
//!
//! Builds real repositories under a temp directory so the git backend
//! can probe, clone and resolve them over `file://` URLs.

use std::path::{Path, PathBuf};
use std::process::Command;

pub struct ScratchRepo {
    pub dir: PathBuf,
}

impl ScratchRepo {
    /// Creates a repository at `<root>/<base>`, where `base` is the
    /// module base path the backend will discover it under.
    pub fn init(root: &Path, base: &str) -> Self {
        let dir = root.join(base);
        std::fs::create_dir_all(&dir).unwrap();
        let repo = Self { dir };
        repo.git(&["init", "--quiet", "--initial-branch=main"], &[]);
        repo.git(&["config", "user.name", "tester"], &[]);
        repo.git(&["config", "user.email", "tester@example.com"], &[]);
        repo
    }

    pub fn write(&self, path: &str, contents: &str) -> &Self {
        let file = self.dir.join(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(file, contents).unwrap();
        self
    }

    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn symlink(&self, path: &str, target: &str) -> &Self {
        let file = self.dir.join(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(target, file).unwrap();
        self
    }

    /// Stages everything and commits it with a fixed committer time
    /// (ISO 8601, e.g. `2022-05-17T00:17:27+00:00`). Returns the commit.
    pub fn commit(&self, message: &str, time: &str) -> String {
        self.git(&["add", "--all"], &[]);
        self.git(
            &["commit", "--quiet", "--allow-empty", "-m", message],
            &[("GIT_AUTHOR_DATE", time), ("GIT_COMMITTER_DATE", time)],
        );
        self.head()
    }

    pub fn tag(&self, name: &str) -> &Self {
        self.git(&["tag", name], &[]);
        self
    }

    #[allow(dead_code)]
    pub fn annotated_tag(&self, name: &str, time: &str) -> &Self {
        self.git(
            &["tag", "-a", name, "-m", name],
            &[("GIT_AUTHOR_DATE", time), ("GIT_COMMITTER_DATE", time)],
        );
        self
    }

    pub fn head(&self) -> String {
        let output = Command::new("git")
            .args(["-C", self.dir.to_str().unwrap(), "rev-parse", "HEAD"])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn git(&self, args: &[&str], envs: &[(&str, &str)]) {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.dir)
            .args(args)
            .envs(envs.iter().copied())
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// The `file://<root>/` origin root the backend should resolve mapped
/// host paths under.
pub fn origin_root(root: &Path) -> String {
    format!("file://{}/", root.display())
}
