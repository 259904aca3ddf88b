//! Error types shared by every stage of a fetch-and-extract run.

use std::path::PathBuf;

use thiserror::Error;

/// A Result type alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure categories, used to pick the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Release, tag or asset lookup failed, or the configuration is unusable.
    Resolution,
    /// A ranged read failed or came back malformed.
    Transport,
    /// The archive index or an entry payload is malformed or unsupported.
    Archive,
    /// An entry would be written outside the target root.
    PathSafety,
    /// Writing to the local filesystem failed.
    Filesystem,
    /// The run was cancelled before it finished.
    Cancelled,
}

impl ErrorKind {
    /// Exit code reported by the CLI for this kind of failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Resolution => 2,
            ErrorKind::Transport => 3,
            ErrorKind::Archive => 4,
            ErrorKind::PathSafety => 5,
            ErrorKind::Filesystem => 6,
            ErrorKind::Cancelled => 130,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("release {owner}/{repo}@{tag} not found")]
    ReleaseNotFound {
        owner: String,
        repo: String,
        tag: String,
    },

    #[error("{name:?} not found in release (available: {})", .available.join(", "))]
    AssetNotFound { name: String, available: Vec<String> },

    #[error("{0:?} has no download url")]
    AssetUrlMissing(String),

    #[error("release API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request for {url} failed with status: {status}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("remote server does not support Range requests")]
    RangeNotSupported,

    #[error("invalid Content-Range header: {0:?}")]
    InvalidContentRange(String),

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("range {offset}+{len} is outside a resource of {size} bytes")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("malformed archive: {0}")]
    Archive(String),

    #[error("{name}: unsupported compression method {method}")]
    UnsupportedCompression { name: String, method: u16 },

    #[error("{name}: encrypted entries are not supported")]
    Encrypted { name: String },

    #[error("{name}: decompressed payload does not match the central directory")]
    Checksum { name: String },

    #[error("illegal file path: {}", .0.display())]
    PathTraversal(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::ReleaseNotFound { .. }
            | Error::AssetNotFound { .. }
            | Error::AssetUrlMissing(_)
            | Error::Api(_) => ErrorKind::Resolution,
            Error::Http(_)
            | Error::UnexpectedStatus { .. }
            | Error::RangeNotSupported
            | Error::InvalidContentRange(_)
            | Error::ShortRead { .. }
            | Error::OutOfBounds { .. } => ErrorKind::Transport,
            Error::Archive(_)
            | Error::UnsupportedCompression { .. }
            | Error::Encrypted { .. }
            | Error::Checksum { .. } => ErrorKind::Archive,
            Error::PathTraversal(_) => ErrorKind::PathSafety,
            Error::Io(_) => ErrorKind::Filesystem,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}
