use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SbxError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Load Error: {reason}")]
    ConfigLoad { reason: String },

    #[error("Software '{name}' not found in catalog")]
    SoftwareNotFound { name: String },

    #[error("Version '{version}' of '{software}' not found in catalog")]
    VersionNotFound { software: String, version: String },

    #[error("Version key '{version}' of '{software}' is not valid semver")]
    InvalidVersion { software: String, version: String },

    #[error("No checksum for platform {os}/{arch} in version '{version}' of '{software}'")]
    PlatformNotFound {
        software: String,
        version: String,
        os: String,
        arch: String,
    },

    #[error("DownloadError: failed to download '{url}': {reason}")]
    Download {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error(
        "Checksum mismatch for {} ({algorithm}): expected {expected}, actual {actual}",
        .path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported checksum algorithm '{algorithm}'")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("ExtractionError: {}: {reason}", .archive.display())]
    Extraction { archive: PathBuf, reason: String },

    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Installation Error: {software} {version}: {reason}")]
    Installation {
        software: String,
        version: String,
        reason: String,
    },

    #[error("Uninstallation Error: {software}: {reason}")]
    Uninstallation { software: String, reason: String },

    #[error("Configuration Error: {software}: {reason}")]
    Configuration { software: String, reason: String },

    #[error("Cleanup Error: {}: {reason}", .path.display())]
    Cleanup { path: PathBuf, reason: String },

    #[error("Filesystem Error: {}: {reason}", .path.display())]
    FileSystem { path: PathBuf, reason: String },

    #[error("Template Error in '{software}': {reason} (template: '{template}')")]
    Template {
        software: String,
        template: String,
        reason: String,
    },

    #[error("Path '{}' escapes base directory '{}'", .path.display(), .base.display())]
    PathTraversal { path: PathBuf, base: PathBuf },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<std::io::Error> for SbxError {
    fn from(err: std::io::Error) -> Self {
        SbxError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for SbxError {
    fn from(err: reqwest::Error) -> Self {
        SbxError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for SbxError {
    fn from(err: serde_json::Error) -> Self {
        SbxError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for SbxError {
    fn from(err: semver::Error) -> Self {
        SbxError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, SbxError>;
