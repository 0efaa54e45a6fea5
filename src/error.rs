//! Error types for dataset preparation.

use std::path::PathBuf;

use thiserror::Error;

use crate::dataloader::Role;

pub type Result<T, E = PrepError> = std::result::Result<T, E>;

/// Errors that can abort a preparation run.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Source image could not be opened or decoded.
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Source image has a zero-sized side.
    #[error("Image {path:?} has invalid dimensions {width}x{height}")]
    InvalidDimension {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    /// Normalized image could not be encoded.
    #[error("Failed to encode image {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Filesystem failure while reading or writing.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// More than one file matched a single-file role.
    #[error("Directory {dir:?} has {} files for role '{role}': {files:?}", .files.len())]
    DuplicateRoleFile {
        dir: PathBuf,
        role: Role,
        files: Vec<PathBuf>,
    },

    /// Source root is missing or not a directory.
    #[error("Source root {0:?} is not a directory")]
    RootNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Existing manifest disagrees with the samples already on disk.
    #[error("Manifest has {manifest_lines} entries but {images} complete samples exist on disk")]
    ManifestMismatch { manifest_lines: u64, images: u64 },

    #[error("Failed to serialize manifest entry: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl PrepError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PrepError::Io { path, source }
    }
}
