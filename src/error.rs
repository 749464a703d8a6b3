//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.
//! Image pipeline failures get their own closed enum so callers can branch on
//! the kind of failure instead of inspecting messages.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single stage of the image pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to download image from {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("image body from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: u64 },

    #[error("download of {url} was cancelled")]
    Cancelled { url: String },

    #[error("failed to detect file extension for content type '{content_type}' ({url})")]
    UnresolvableContentType { url: String, content_type: String },

    #[error("failed to create storage root {}: {source}", .path.display())]
    StorageInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to save image to {}: {source}", .path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported image format '{extension}' ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to save compressed image {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Stable tag for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::BodyTooLarge { .. } => "body_too_large",
            Self::Cancelled { .. } => "cancelled",
            Self::UnresolvableContentType { .. } => "unresolvable_content_type",
            Self::StorageInit { .. } => "storage_init",
            Self::StorageWrite { .. } => "storage_write",
            Self::Decode { .. } => "decode",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Encode { .. } => "encode",
            Self::Worker(_) => "worker",
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Error::Database(format!("connection pool error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
