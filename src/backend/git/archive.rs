//! Module zip construction
//!
//! Streams a commit's subtree into the module zip layout: every entry is
//! prefixed `<path>@<version>/`, nested modules and vendored code are
//! left out, symlinks are skipped, and a sub-module without a LICENSE
//! inherits the repository root's one.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::backend::git::cache::RepoState;
use crate::backend::git::cli::TreeEntry;
use crate::backend::git::GitBackend;
use crate::backend::BackendError;
use crate::module::{split_path_version, split_submodule};

impl GitBackend {
    pub(super) async fn build_archive(
        &self,
        path: &str,
        version: &str,
    ) -> Result<Vec<u8>, BackendError> {
        let (prefix, major) = split_path_version(path);
        let entry = self.repository(prefix).await?;
        let guard = entry.lock().await;
        if *guard != RepoState::Cloned {
            return Err(BackendError::NotFound);
        }
        self.refresh(&entry).await;

        let submodule = split_submodule(prefix, entry.base());
        let bare_version = version.strip_suffix("+incompatible").unwrap_or(version);
        let rev = super::revision(bare_version, submodule)?;
        let commit = self.cli.rev_parse_commit(entry.dir(), &rev).await?;

        // Descend into the subtree that holds the module: first the
        // sub-module directory, then a major-version directory if the
        // repository keeps one. A missing directory keeps the previous
        // tree for that step.
        let mut subpath = String::new();
        if !submodule.is_empty()
            && self
                .cli
                .tree_exists(entry.dir(), &format!("{commit}:{submodule}"))
                .await
        {
            subpath = submodule.to_string();
        }
        let major_dir = major.trim_start_matches('/');
        if !major_dir.is_empty() {
            let candidate = if subpath.is_empty() {
                major_dir.to_string()
            } else {
                format!("{subpath}/{major_dir}")
            };
            if self
                .cli
                .tree_exists(entry.dir(), &format!("{commit}:{candidate}"))
                .await
            {
                subpath = candidate;
            }
        }

        let treeish = if subpath.is_empty() {
            commit.clone()
        } else {
            format!("{commit}:{subpath}")
        };
        let files = self.cli.ls_tree(entry.dir(), &treeish).await?;

        let zip_prefix = format!("{path}@{version}");
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        // A sub-module without its own LICENSE inherits the repository
        // owner's.
        if !files.iter().any(|f| f.path == "LICENSE") {
            if let Some(license) = self.read_file(&entry, &commit, "LICENSE").await? {
                writer
                    .start_file(format!("{zip_prefix}/LICENSE"), options)
                    .map_err(archive_error)?;
                writer.write_all(&license).map_err(archive_error)?;
            }
        }

        let ignored = nested_module_prefixes(&files);

        for file in &files {
            if !included_in_module(file, &ignored) {
                continue;
            }
            let data = self.cli.cat_blob(entry.dir(), &file.hash).await?;
            writer
                .start_file(format!("{zip_prefix}/{}", file.path), options)
                .map_err(archive_error)?;
            writer.write_all(&data).map_err(archive_error)?;
        }

        let cursor = writer.finish().map_err(archive_error)?;
        Ok(cursor.into_inner())
    }
}

fn archive_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Internal(format!("failed to build module zip: {err}"))
}

/// Directory prefixes of nested modules: any `go.mod` below the module
/// root claims its directory for a different module.
fn nested_module_prefixes(files: &[TreeEntry]) -> Vec<String> {
    files
        .iter()
        .filter_map(|file| {
            let dir = file.path.strip_suffix("/go.mod")?;
            Some(format!("{dir}/"))
        })
        .collect()
}

/// Whether a tree entry belongs in the module zip.
fn included_in_module(file: &TreeEntry, ignored: &[String]) -> bool {
    if !file.is_blob() || file.is_symlink() {
        return false;
    }
    if ignored.iter().any(|prefix| file.path.starts_with(prefix)) {
        return false;
    }
    if file.path.starts_with("vendor/") || file.path.contains("/vendor/") {
        // Only the vendor manifests survive.
        return file.path.ends_with("vendor/modules.txt")
            || file.path.ends_with("vendor/vendor.json");
    }
    true
}
