//! Resource types and cgroup resource descriptors
//!
//! A [`CgroupResource`] binds a [`ResourceType`] to the interface file that
//! carries it for one cgroup version, along with the rule deciding which
//! values the kernel accepts.

use crate::cgroup::CgroupVersion;
use crate::{CGROUP_MAX_SYMBOL_STR, CGROUP_MAX_VALUE_STR};
use rex_cpuset::CpuSet;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one kernel tunable
///
/// Well-known kinds are named after their cgroup-v1 file, so the same
/// identity addresses `memory.limit_in_bytes` on v1 and `memory.max` on v2.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(Cow<'static, str>);

impl ResourceType {
    /// `cpu.shares`
    pub const CPU_SHARES: Self = Self::from_static("cpu.shares");
    /// `cpu.cfs_quota_us`
    pub const CPU_CFS_QUOTA: Self = Self::from_static("cpu.cfs_quota_us");
    /// `cpu.cfs_period_us`
    pub const CPU_CFS_PERIOD: Self = Self::from_static("cpu.cfs_period_us");
    /// `cpu.cfs_burst_us`
    pub const CPU_BURST: Self = Self::from_static("cpu.cfs_burst_us");
    /// `tasks`
    pub const CPU_TASKS: Self = Self::from_static("tasks");
    /// `cpu.bvt_warp_ns`
    pub const CPU_BVT_WARP_NS: Self = Self::from_static("cpu.bvt_warp_ns");
    /// `cpuset.cpus`
    pub const CPUSET_CPUS: Self = Self::from_static("cpuset.cpus");
    /// `memory.limit_in_bytes`
    pub const MEMORY_LIMIT: Self = Self::from_static("memory.limit_in_bytes");
    /// `memory.usage_in_bytes`
    pub const MEMORY_USAGE: Self = Self::from_static("memory.usage_in_bytes");
    /// `memory.min`
    pub const MEMORY_MIN: Self = Self::from_static("memory.min");
    /// `memory.low`
    pub const MEMORY_LOW: Self = Self::from_static("memory.low");
    /// `memory.high`
    pub const MEMORY_HIGH: Self = Self::from_static("memory.high");
    /// `memory.wmark_ratio`
    pub const MEMORY_WMARK_RATIO: Self = Self::from_static("memory.wmark_ratio");
    /// `memory.wmark_scale_factor`
    pub const MEMORY_WMARK_SCALE_FACTOR: Self = Self::from_static("memory.wmark_scale_factor");
    /// `memory.wmark_min_adj`
    pub const MEMORY_WMARK_MIN_ADJ: Self = Self::from_static("memory.wmark_min_adj");
    /// `memory.priority`
    pub const MEMORY_PRIORITY: Self = Self::from_static("memory.priority");
    /// `memory.use_priority_oom`
    pub const MEMORY_USE_PRIORITY_OOM: Self = Self::from_static("memory.use_priority_oom");
    /// `memory.oom.group`
    pub const MEMORY_OOM_GROUP: Self = Self::from_static("memory.oom.group");
    /// `blkio.throttle.read_iops_device`
    pub const BLKIO_READ_IOPS: Self = Self::from_static("blkio.throttle.read_iops_device");
    /// `blkio.throttle.read_bps_device`
    pub const BLKIO_READ_BPS: Self = Self::from_static("blkio.throttle.read_bps_device");
    /// `blkio.throttle.write_iops_device`
    pub const BLKIO_WRITE_IOPS: Self = Self::from_static("blkio.throttle.write_iops_device");
    /// `blkio.throttle.write_bps_device`
    pub const BLKIO_WRITE_BPS: Self = Self::from_static("blkio.throttle.write_bps_device");

    /// Create from a static name
    #[inline]
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Create from an owned name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Name as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ResourceType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ResourceType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Validity rule for values written to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceValidator {
    /// Any value is passed through to the kernel
    #[default]
    Any,

    /// Signed integer within inclusive bounds
    Range {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
        /// Also accept the symbolic `max`
        allow_max: bool,
    },

    /// CPU list expression
    CpuSet,
}

impl ResourceValidator {
    /// Integer range without the symbolic `max`
    #[inline]
    #[must_use]
    pub const fn range(min: i64, max: i64) -> Self {
        Self::Range {
            min,
            max,
            allow_max: false,
        }
    }

    /// Check a value, returning the reason on rejection
    ///
    /// # Errors
    /// Returns a human-readable message when the value is rejected.
    pub fn check(&self, value: &str) -> Result<(), String> {
        match *self {
            Self::Any => Ok(()),
            Self::Range {
                min,
                max,
                allow_max,
            } => {
                if allow_max && (value == CGROUP_MAX_SYMBOL_STR || value == CGROUP_MAX_VALUE_STR) {
                    return Ok(());
                }
                let v: i64 = value
                    .parse()
                    .map_err(|e| format!("value {value:?} is not an integer: {e}"))?;
                if v < min || v > max {
                    return Err(format!("value {v} not in range [{min}, {max}]"));
                }
                Ok(())
            }
            Self::CpuSet => CpuSet::parse(value)
                .map(|_| ())
                .map_err(|e| format!("value {value:?} is not a valid cpuset: {e}")),
        }
    }
}

/// Descriptor of one resource on one cgroup version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupResource {
    resource_type: ResourceType,
    file_name: Cow<'static, str>,
    subsystem: Cow<'static, str>,
    version: CgroupVersion,
    validator: ResourceValidator,
}

impl CgroupResource {
    /// Descriptor for a cgroup-v1 file under the given subsystem directory
    #[must_use]
    pub fn v1(
        resource_type: ResourceType,
        subsystem: &'static str,
        file_name: &'static str,
    ) -> Self {
        Self {
            resource_type,
            file_name: Cow::Borrowed(file_name),
            subsystem: Cow::Borrowed(subsystem),
            version: CgroupVersion::V1,
            validator: ResourceValidator::Any,
        }
    }

    /// Descriptor for a file on the unified (v2) hierarchy
    #[must_use]
    pub fn v2(resource_type: ResourceType, file_name: &'static str) -> Self {
        Self {
            resource_type,
            file_name: Cow::Borrowed(file_name),
            subsystem: Cow::Borrowed(""),
            version: CgroupVersion::V2,
            validator: ResourceValidator::Any,
        }
    }

    /// Set validity rule
    #[inline]
    #[must_use]
    pub fn with_validator(mut self, validator: ResourceValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Resource identity
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Interface file name
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Cgroup version this descriptor belongs to
    #[inline]
    #[must_use]
    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Validity rule
    #[inline]
    #[must_use]
    pub fn validator(&self) -> ResourceValidator {
        self.validator
    }

    /// Resolve the interface file for a cgroup directory
    ///
    /// `parent_dir` is relative to the hierarchy root; a leading `/` is
    /// ignored so absolute-looking cgroup paths do not escape `root`.
    #[must_use]
    pub fn path(&self, root: &Path, parent_dir: &str) -> PathBuf {
        let parent_dir = parent_dir.trim_start_matches('/');
        let mut path = root.to_path_buf();
        if self.version == CgroupVersion::V1 {
            path.push(self.subsystem.as_ref());
        }
        if !parent_dir.is_empty() {
            path.push(parent_dir);
        }
        path.push(self.file_name.as_ref());
        path
    }

    /// Check a value against this resource's rule
    ///
    /// # Errors
    /// Returns the validator message when the value is rejected.
    #[inline]
    pub fn is_valid(&self, value: &str) -> Result<(), String> {
        self.validator.check(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_const_equals_owned() {
        assert_eq!(ResourceType::MEMORY_MIN, ResourceType::new("memory.min"));
        assert_eq!(ResourceType::CPUSET_CPUS.to_string(), "cpuset.cpus");
    }

    #[test]
    fn v1_path_includes_subsystem() {
        let r = CgroupResource::v1(ResourceType::MEMORY_MIN, "memory", "memory.min");
        assert_eq!(
            r.path(Path::new("/sys/fs/cgroup"), "kubepods/pod1"),
            PathBuf::from("/sys/fs/cgroup/memory/kubepods/pod1/memory.min")
        );
    }

    #[test]
    fn v2_path_is_unified() {
        let r = CgroupResource::v2(ResourceType::MEMORY_LIMIT, "memory.max");
        assert_eq!(
            r.path(Path::new("/sys/fs/cgroup"), "/kubepods.slice"),
            PathBuf::from("/sys/fs/cgroup/kubepods.slice/memory.max")
        );
    }

    #[test]
    fn root_cgroup_path() {
        let r = CgroupResource::v1(ResourceType::CPU_SHARES, "cpu", "cpu.shares");
        assert_eq!(
            r.path(Path::new("/cg"), ""),
            PathBuf::from("/cg/cpu/cpu.shares")
        );
    }

    #[test]
    fn range_validator() {
        let v = ResourceValidator::range(0, 100);
        assert!(v.check("0").is_ok());
        assert!(v.check("100").is_ok());
        assert!(v.check("101").is_err());
        assert!(v.check("-1").is_err());
        assert!(v.check("abc").is_err());
        assert!(v.check("max").is_err());
    }

    #[test]
    fn range_validator_with_max_symbol() {
        let v = ResourceValidator::Range {
            min: 0,
            max: i64::MAX,
            allow_max: true,
        };
        assert!(v.check("max").is_ok());
        assert!(v.check(CGROUP_MAX_VALUE_STR).is_ok());
        assert!(v.check("1024").is_ok());
    }

    #[test]
    fn cpuset_validator() {
        let v = ResourceValidator::CpuSet;
        assert!(v.check("0-3,5").is_ok());
        assert!(v.check("").is_ok());
        assert!(v.check("3-1").is_err());
    }
}
