//! Cgroup hierarchy layout and file primitives
//!
//! [`CgroupFs`] resolves [`CgroupResource`]s under a hierarchy root and
//! performs the read, write and write-if-different operations through a
//! [`FileAccess`].

use crate::access::FileAccess;
use crate::error::SystemError;
use crate::resource::CgroupResource;
use crate::{CGROUP_INT64_MAX_STR, CGROUP_MAX_SYMBOL_STR, CGROUP_MAX_VALUE_STR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cgroup hierarchy version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupVersion {
    /// Per-subsystem hierarchies
    #[default]
    V1,

    /// Unified hierarchy
    V2,
}

impl CgroupVersion {
    /// Detect the version mounted at `root`
    ///
    /// The unified hierarchy exposes `cgroup.controllers` at its root; v1
    /// mounts a tmpfs with one directory per subsystem instead.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        if root.join("cgroup.controllers").exists() {
            Self::V2
        } else {
            Self::V1
        }
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2"),
        }
    }
}

/// Cgroup file primitives bound to a hierarchy root
#[derive(Debug, Clone)]
pub struct CgroupFs {
    root: PathBuf,
    version: CgroupVersion,
    access: Arc<dyn FileAccess>,
}

impl CgroupFs {
    /// Create primitives for the hierarchy mounted at `root`
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        version: CgroupVersion,
        access: Arc<dyn FileAccess>,
    ) -> Self {
        Self {
            root: root.into(),
            version,
            access,
        }
    }

    /// Same hierarchy, different file access (e.g. through a sandbox)
    #[must_use]
    pub fn with_access(&self, access: Arc<dyn FileAccess>) -> Self {
        Self {
            root: self.root.clone(),
            version: self.version,
            access,
        }
    }

    /// Hierarchy root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hierarchy version
    #[inline]
    #[must_use]
    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Underlying file access
    #[inline]
    #[must_use]
    pub fn access(&self) -> &Arc<dyn FileAccess> {
        &self.access
    }

    /// Resolve the interface file of `resource` in cgroup `parent_dir`
    #[inline]
    #[must_use]
    pub fn resolve(&self, parent_dir: &str, resource: &CgroupResource) -> PathBuf {
        resource.path(&self.root, parent_dir)
    }

    /// Read the current value
    ///
    /// # Errors
    /// Returns [`SystemError`] if the file cannot be read.
    pub fn read(&self, parent_dir: &str, resource: &CgroupResource) -> Result<String, SystemError> {
        let path = self.resolve(parent_dir, resource);
        self.access.read(&path)
    }

    /// Validate and write `value` unconditionally
    ///
    /// # Errors
    /// Returns [`SystemError::InvalidValue`] if the resource rejects the
    /// value, or the access error if the write fails.
    pub fn write(
        &self,
        parent_dir: &str,
        resource: &CgroupResource,
        value: &str,
    ) -> Result<(), SystemError> {
        let path = self.resolve(parent_dir, resource);
        resource
            .is_valid(value)
            .map_err(|message| SystemError::InvalidValue {
                path: path.clone(),
                message,
            })?;
        tracing::trace!("write cgroup file {} = {}", path.display(), value);
        self.access.write(&path, value)
    }

    /// Write `value` only if it differs from the current value
    ///
    /// Returns whether a write happened.
    ///
    /// # Errors
    /// Returns [`SystemError`] if the current value cannot be read or the
    /// write fails.
    pub fn write_if_different(
        &self,
        parent_dir: &str,
        resource: &CgroupResource,
        value: &str,
    ) -> Result<bool, SystemError> {
        let current = self.read(parent_dir, resource)?;
        if is_same_value(&current, value) {
            tracing::trace!(
                "skip writing cgroup file {} since value unchanged: {}",
                self.resolve(parent_dir, resource).display(),
                value
            );
            return Ok(false);
        }
        self.write(parent_dir, resource, value)?;
        Ok(true)
    }
}

/// Write a plain (non-cgroup) file only if `value` differs from its content
///
/// Returns whether a write happened.
///
/// # Errors
/// Returns [`SystemError`] if the file cannot be read or written.
pub fn common_file_write_if_different(
    access: &dyn FileAccess,
    path: &Path,
    value: &str,
) -> Result<bool, SystemError> {
    let current = access.read(path)?;
    if current == value {
        tracing::trace!("skip writing file {} since value unchanged: {}", path.display(), value);
        return Ok(false);
    }
    tracing::trace!("write file {} = {}", path.display(), value);
    access.write(path, value)?;
    Ok(true)
}

// v1 renders an unlimited value as the page-aligned i64 max and v2 as `max`,
// so a requested unlimited value equals either reading.
fn is_same_value(current: &str, value: &str) -> bool {
    current == value
        || (value == CGROUP_MAX_SYMBOL_STR && current == CGROUP_MAX_VALUE_STR)
        || (value == CGROUP_INT64_MAX_STR && current == CGROUP_MAX_SYMBOL_STR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::HostFileAccess;
    use crate::resource::{ResourceType, ResourceValidator};

    fn memory_min() -> CgroupResource {
        CgroupResource::v1(ResourceType::MEMORY_MIN, "memory", "memory.min")
            .with_validator(ResourceValidator::range(0, i64::MAX))
    }

    fn setup(value: &str) -> (tempfile::TempDir, CgroupFs) {
        let dir = tempfile::tempdir().unwrap();
        let cg = dir.path().join("memory/kubepods");
        std::fs::create_dir_all(&cg).unwrap();
        std::fs::write(cg.join("memory.min"), value).unwrap();
        let fs = CgroupFs::new(dir.path(), CgroupVersion::V1, Arc::new(HostFileAccess));
        (dir, fs)
    }

    #[test]
    fn detect_version() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V1);

        std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory").unwrap();
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V2);
    }

    #[test]
    fn read_and_write() {
        let (_dir, fs) = setup("0\n");
        let r = memory_min();

        assert_eq!(fs.read("kubepods", &r).unwrap(), "0");
        fs.write("kubepods", &r, "1024").unwrap();
        assert_eq!(fs.read("kubepods", &r).unwrap(), "1024");
    }

    #[test]
    fn write_rejects_invalid_value() {
        let (_dir, fs) = setup("0");
        let err = fs.write("kubepods", &memory_min(), "-5").unwrap_err();
        assert!(matches!(err, SystemError::InvalidValue { .. }));
        assert_eq!(fs.read("kubepods", &memory_min()).unwrap(), "0");
    }

    #[test]
    fn write_if_different_skips_equal() {
        let (_dir, fs) = setup("100");
        let r = memory_min();

        assert!(!fs.write_if_different("kubepods", &r, "100").unwrap());
        assert!(fs.write_if_different("kubepods", &r, "200").unwrap());
        assert_eq!(fs.read("kubepods", &r).unwrap(), "200");
    }

    #[test]
    fn write_if_different_treats_max_as_unlimited() {
        assert!(is_same_value(CGROUP_MAX_VALUE_STR, "max"));
        assert!(is_same_value("max", CGROUP_INT64_MAX_STR));
        assert!(!is_same_value("max", "1024"));
        assert!(!is_same_value(CGROUP_MAX_VALUE_STR, "1024"));
    }

    #[test]
    fn write_if_different_skips_int64_max_over_v2_max() {
        let dir = tempfile::tempdir().unwrap();
        let cg = dir.path().join("kubepods");
        std::fs::create_dir_all(&cg).unwrap();
        std::fs::write(cg.join("memory.max"), "max\n").unwrap();
        let fs = CgroupFs::new(dir.path(), CgroupVersion::V2, Arc::new(HostFileAccess));
        let r = CgroupResource::v2(ResourceType::MEMORY_LIMIT, "memory.max").with_validator(
            ResourceValidator::Range {
                min: 0,
                max: i64::MAX,
                allow_max: true,
            },
        );

        assert!(!fs.write_if_different("kubepods", &r, CGROUP_INT64_MAX_STR).unwrap());
        assert_eq!(fs.read("kubepods", &r).unwrap(), "max");
    }

    #[test]
    fn write_if_different_missing_file() {
        let (_dir, fs) = setup("0");
        let err = fs
            .write_if_different("kubepods/missing", &memory_min(), "1")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn common_file_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("min_free_kbytes");
        std::fs::write(&path, "67584\n").unwrap();

        assert!(!common_file_write_if_different(&HostFileAccess, &path, "67584").unwrap());
        assert!(common_file_write_if_different(&HostFileAccess, &path, "90000").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "90000");
    }
}
