//! Error types for the layer-crop crate.

use std::path::PathBuf;

/// Errors that can occur while building masks, cropping regions, or compositing layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A rectangle whose far corner lies before its near corner.
    #[error("invalid rectangle ({x1}, {y1}, {x2}, {y2}): expected x1 <= x2 and y1 <= y2")]
    InvalidRect {
        /// Left edge.
        x1: i32,
        /// Top edge.
        y1: i32,
        /// Right edge (exclusive).
        x2: i32,
        /// Bottom edge (exclusive).
        y2: i32,
    },

    /// The blur size does not fit the signed coordinate space.
    #[error("blur size {0} is out of range")]
    InvalidBlurSize(u32),

    /// The composer input has no `origin/` folder.
    #[error("origin folder not found: {}", .0.display())]
    MissingOrigin(PathBuf),

    /// None of the requested layer folders exist.
    #[error("no layer folders found in {}", .0.display())]
    NoLayers(PathBuf),

    /// An expected crop, mask, or metadata file is absent.
    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Metadata or detection JSON could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
