//! File access seam
//!
//! Every read and write of a kernel interface file goes through a
//! [`FileAccess`]. [`HostFileAccess`] touches the host filesystem directly;
//! [`SandboxBoundAccess`] routes through a [`SandboxFileAccess`] so the
//! operation runs inside an isolated execution context.

use crate::error::SystemError;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Read/write primitive for interface files
pub trait FileAccess: Send + Sync + Debug {
    /// Read the whole file, with surrounding whitespace trimmed
    ///
    /// # Errors
    /// Returns [`SystemError`] if the file cannot be read.
    fn read(&self, path: &Path) -> Result<String, SystemError>;

    /// Replace the file contents with `value`
    ///
    /// The file must already exist; kernel interface files are never created.
    ///
    /// # Errors
    /// Returns [`SystemError`] if the file cannot be written.
    fn write(&self, path: &Path, value: &str) -> Result<(), SystemError>;
}

/// Direct host filesystem access
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFileAccess;

impl FileAccess for HostFileAccess {
    fn read(&self, path: &Path) -> Result<String, SystemError> {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| SystemError::io(path, e))
    }

    fn write(&self, path: &Path, value: &str) -> Result<(), SystemError> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| SystemError::io(path, e))?;
        file.write_all(value.as_bytes())
            .map_err(|e| SystemError::io(path, e))
    }
}

/// File access executed inside a sandbox
///
/// Implementations own the transport to the sandbox (agent socket, exec
/// into the sandbox's namespaces, ...).
pub trait SandboxFileAccess: Send + Sync + Debug {
    /// Read a file as seen from inside the sandbox
    ///
    /// # Errors
    /// Returns [`SystemError`] if the sandbox is unreachable or the read fails.
    fn read(&self, sandbox_id: &str, path: &Path) -> Result<String, SystemError>;

    /// Write a file as seen from inside the sandbox
    ///
    /// # Errors
    /// Returns [`SystemError`] if the sandbox is unreachable or the write fails.
    fn write(&self, sandbox_id: &str, path: &Path, value: &str) -> Result<(), SystemError>;
}

/// [`FileAccess`] pinned to one sandbox
#[derive(Debug, Clone)]
pub struct SandboxBoundAccess {
    sandbox_id: String,
    inner: Arc<dyn SandboxFileAccess>,
}

impl SandboxBoundAccess {
    /// Bind a sandbox transport to one sandbox identity
    #[inline]
    #[must_use]
    pub fn new(sandbox_id: impl Into<String>, inner: Arc<dyn SandboxFileAccess>) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            inner,
        }
    }

    /// Sandbox identity
    #[inline]
    #[must_use]
    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }
}

impl FileAccess for SandboxBoundAccess {
    fn read(&self, path: &Path) -> Result<String, SystemError> {
        self.inner.read(&self.sandbox_id, path)
    }

    fn write(&self, path: &Path, value: &str) -> Result<(), SystemError> {
        self.inner.write(&self.sandbox_id, path, value)
    }
}
