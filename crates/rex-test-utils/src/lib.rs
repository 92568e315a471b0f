//! Testing utilities for REX workspace
//!
//! Shared test helpers, fixtures, and in-memory file access.

#![allow(missing_docs)]

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rex_system::{
    CgroupFs, CgroupVersion, FileAccess, HostFileAccess, SandboxFileAccess, SystemError,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory interface files with a write log
#[derive(Debug, Default)]
pub struct MemoryFileAccess {
    files: DashMap<PathBuf, String>,
    writes: Mutex<Vec<(PathBuf, String)>>,
    failing_reads: DashSet<PathBuf>,
    failing_writes: DashSet<PathBuf>,
}

impl MemoryFileAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, value: &str) -> Self {
        self.set(path, value);
        self
    }

    /// Seed a file without recording a write
    pub fn set(&self, path: impl Into<PathBuf>, value: &str) {
        self.files.insert(path.into(), value.to_string());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.get(path.as_ref()).map(|v| v.clone())
    }

    pub fn fail_reads(&self, path: impl Into<PathBuf>) {
        self.failing_reads.insert(path.into());
    }

    pub fn fail_writes(&self, path: impl Into<PathBuf>) {
        self.failing_writes.insert(path.into());
    }

    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl FileAccess for MemoryFileAccess {
    fn read(&self, path: &Path) -> Result<String, SystemError> {
        if self.failing_reads.contains(path) {
            return Err(SystemError::io(path, io::Error::other("injected read failure")));
        }
        self.files
            .get(path)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| SystemError::io(path, io::Error::from(io::ErrorKind::NotFound)))
    }

    fn write(&self, path: &Path, value: &str) -> Result<(), SystemError> {
        if self.failing_writes.contains(path) {
            return Err(SystemError::io(path, io::Error::other("injected write failure")));
        }
        match self.files.get_mut(path) {
            Some(mut entry) => {
                *entry = value.to_string();
            }
            None => {
                return Err(SystemError::io(path, io::Error::from(io::ErrorKind::NotFound)));
            }
        }
        self.writes.lock().push((path.to_path_buf(), value.to_string()));
        Ok(())
    }
}

/// Sandbox transport backed by one [`MemoryFileAccess`] per sandbox
#[derive(Debug, Default)]
pub struct MemorySandbox {
    sandboxes: DashMap<String, Arc<MemoryFileAccess>>,
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sandbox_id: &str, files: Arc<MemoryFileAccess>) {
        self.sandboxes.insert(sandbox_id.to_string(), files);
    }

    fn files(&self, sandbox_id: &str) -> Result<Arc<MemoryFileAccess>, SystemError> {
        self.sandboxes
            .get(sandbox_id)
            .map(|f| Arc::clone(&f))
            .ok_or_else(|| SystemError::Sandbox {
                sandbox_id: sandbox_id.to_string(),
                message: "sandbox not found".to_string(),
            })
    }
}

impl SandboxFileAccess for MemorySandbox {
    fn read(&self, sandbox_id: &str, path: &Path) -> Result<String, SystemError> {
        self.files(sandbox_id)?.read(path)
    }

    fn write(&self, sandbox_id: &str, path: &Path, value: &str) -> Result<(), SystemError> {
        self.files(sandbox_id)?.write(path, value)
    }
}

/// Cgroup hierarchy in a temporary directory
pub struct CgroupTree {
    dir: tempfile::TempDir,
    version: CgroupVersion,
}

impl CgroupTree {
    pub fn new(version: CgroupVersion) -> Self {
        let dir = tempfile::tempdir().unwrap();
        if version == CgroupVersion::V2 {
            std::fs::write(
                dir.path().join("cgroup.controllers"),
                "cpuset cpu io memory",
            )
            .unwrap();
        }
        Self { dir, version }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Create `relative` (e.g. `memory/kubepods/memory.min`) with `value`
    pub fn file(&self, relative: &str, value: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, value).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative))
            .unwrap()
            .trim()
            .to_string()
    }

    pub fn host_fs(&self) -> CgroupFs {
        CgroupFs::new(self.dir.path(), self.version, Arc::new(HostFileAccess))
    }
}

/// Cgroup primitives over in-memory files rooted at `/cg`
pub fn memory_cgroup_fs(version: CgroupVersion) -> (Arc<MemoryFileAccess>, CgroupFs) {
    let files = Arc::new(MemoryFileAccess::new());
    let fs = CgroupFs::new("/cg", version, files.clone());
    (files, fs)
}
