//! Error types for the mirrorfs core.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error raised by a transform implementation.
///
/// Transforms may attach a platform errno; the mount front-end reports it
/// unchanged. Without one the failure is reported as `ENOENT`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransformError {
    message: String,
    errno: Option<i32>,
}

impl TransformError {
    /// Creates a transform error without an errno.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errno: None,
        }
    }

    /// Attaches a platform errno to the error.
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    /// Returns the attached errno, if any.
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for TransformError {
    fn from(err: io::Error) -> Self {
        Self {
            message: err.to_string(),
            errno: err.raw_os_error(),
        }
    }
}

/// Result type returned by transforms.
pub type TransformResult<T> = std::result::Result<T, TransformError>;

/// Error type for every core operation.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The presented name has no real counterpart, or the transform no longer maps to it.
    #[error("Path not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A write or resize was attempted through a pipeline without a reverse transform.
    #[error("Read-only mirror, cannot modify: {}", .path.display())]
    ReadOnly { path: PathBuf },

    /// Failure from the underlying filesystem.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure raised by the transform pipeline.
    #[error("Transform failed on {}: {source}", .path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: TransformError,
    },

    /// An offset or size that cannot be represented in memory.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration validation failed.
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}

impl MirrorError {
    pub(crate) fn not_found(path: &Path) -> Self {
        MirrorError::NotFound {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn read_only(path: &Path) -> Self {
        MirrorError::ReadOnly {
            path: path.to_path_buf(),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        MirrorError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn transform(path: &Path, source: TransformError) -> Self {
        MirrorError::Transform {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Translates the error into the errno reported to the kernel.
    ///
    /// Io errors without an OS code become `EIO`. Transform errors without
    /// an errno become `ENOENT`, so a rejected entry looks missing.
    pub fn errno(&self) -> i32 {
        match self {
            MirrorError::NotFound { .. } => libc::ENOENT,
            MirrorError::ReadOnly { .. } => libc::EROFS,
            MirrorError::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            MirrorError::Transform { source, .. } => source.errno().unwrap_or(libc::ENOENT),
            MirrorError::InvalidArgument(_) | MirrorError::InvalidConfig(_) => libc::EINVAL,
        }
    }

    /// Returns true if this error reports a missing entry.
    pub fn is_not_found(&self) -> bool {
        self.errno() == libc::ENOENT
    }
}

/// Result type alias for mirrorfs operations.
pub type Result<T> = std::result::Result<T, MirrorError>;
