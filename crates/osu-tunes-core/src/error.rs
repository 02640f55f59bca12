//! Error types for osu-tunes-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for osu-tunes operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("No download mirrors configured")]
    NoMirrors,

    #[error("Download cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for osu-tunes operations
pub type Result<T> = std::result::Result<T, Error>;
