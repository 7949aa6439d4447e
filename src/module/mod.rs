//! Go module-path rules
//!
//! The subset of the module-path conventions the proxy needs: path syntax
//! validation, major-version suffix handling, canonical semver forms,
//! pseudo-versions, and the `!x` escaping used on the wire.
//!
//! # Modules
//!
//! - [`path`]: path syntax and major-suffix splitting
//! - [`version`]: canonical versions, majors, pseudo-versions
//! - [`escape`]: module path and version escaping

pub mod escape;
pub mod path;
pub mod version;

pub use escape::{escape_path, escape_version, unescape_path, unescape_version};
pub use path::{check_path, split_path_version, split_submodule};
pub use version::{
    canonical_version, check_path_major, is_pseudo_version, pseudo_version, pseudo_version_rev,
};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid module path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid escaped string '{0}'")]
    InvalidEscape(String),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),
}
