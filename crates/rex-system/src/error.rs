//! Error types for kernel interface access

use std::path::PathBuf;

/// Failure reading or writing a kernel interface file
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Filesystem error
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Value rejected by the resource's validity rule
    #[error("invalid value for {}: {message}", path.display())]
    InvalidValue {
        /// Target file
        path: PathBuf,
        /// Validator message
        message: String,
    },

    /// Sandbox routing failed
    #[error("sandbox {sandbox_id} file access failed: {message}")]
    Sandbox {
        /// Sandbox identity
        sandbox_id: String,
        /// Diagnostic
        message: String,
    },
}

impl SystemError {
    /// Wrap an io error with the target path
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the target file does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
