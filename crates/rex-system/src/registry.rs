//! Resource descriptor registry
//!
//! Provides [`ResourceRegistry`], the lookup from `(version, resource type)`
//! to the [`CgroupResource`] that knows its file and validity rule.

use crate::cgroup::CgroupVersion;
use crate::resource::{CgroupResource, ResourceType, ResourceValidator};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of known cgroup resources
///
/// Built once at startup and read-only afterwards; share it behind an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    resources: HashMap<(CgroupVersion, ResourceType), Arc<CgroupResource>>,
}

impl ResourceRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
        }
    }

    /// Create registry with the built-in resources for both versions
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for resource in default_v1_resources() {
            registry.add(resource);
        }
        for resource in default_v2_resources() {
            registry.add(resource);
        }
        registry
    }

    /// Add a descriptor, replacing any existing one for the same key
    pub fn add(&mut self, resource: CgroupResource) {
        let key = (resource.version(), resource.resource_type().clone());
        self.resources.insert(key, Arc::new(resource));
    }

    /// Look up a descriptor
    #[inline]
    #[must_use]
    pub fn get(
        &self,
        version: CgroupVersion,
        resource_type: &ResourceType,
    ) -> Option<Arc<CgroupResource>> {
        self.resources
            .get(&(version, resource_type.clone()))
            .cloned()
    }

    /// Check if a descriptor exists
    #[inline]
    #[must_use]
    pub fn contains(&self, version: CgroupVersion, resource_type: &ResourceType) -> bool {
        self.resources
            .contains_key(&(version, resource_type.clone()))
    }

    /// Get number of descriptors across both versions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn default_v1_resources() -> Vec<CgroupResource> {
    type V = ResourceValidator;
    type R = ResourceType;

    vec![
        CgroupResource::v1(R::CPU_SHARES, "cpu", "cpu.shares")
            .with_validator(V::range(2, i64::MAX)),
        CgroupResource::v1(R::CPU_CFS_QUOTA, "cpu", "cpu.cfs_quota_us")
            .with_validator(V::range(-1, i64::MAX)),
        CgroupResource::v1(R::CPU_CFS_PERIOD, "cpu", "cpu.cfs_period_us")
            .with_validator(V::range(1_000, 1_000_000)),
        CgroupResource::v1(R::CPU_BURST, "cpu", "cpu.cfs_burst_us")
            .with_validator(V::range(0, i64::MAX)),
        CgroupResource::v1(R::CPU_TASKS, "cpu", "tasks"),
        CgroupResource::v1(R::CPU_BVT_WARP_NS, "cpu", "cpu.bvt_warp_ns")
            .with_validator(V::range(-1, 2)),
        CgroupResource::v1(R::CPUSET_CPUS, "cpuset", "cpuset.cpus").with_validator(V::CpuSet),
        CgroupResource::v1(R::MEMORY_LIMIT, "memory", "memory.limit_in_bytes")
            .with_validator(V::range(-1, i64::MAX)),
        CgroupResource::v1(R::MEMORY_USAGE, "memory", "memory.usage_in_bytes"),
        CgroupResource::v1(R::MEMORY_MIN, "memory", "memory.min")
            .with_validator(V::range(0, i64::MAX)),
        CgroupResource::v1(R::MEMORY_LOW, "memory", "memory.low")
            .with_validator(V::range(0, i64::MAX)),
        CgroupResource::v1(R::MEMORY_HIGH, "memory", "memory.high")
            .with_validator(V::range(0, i64::MAX)),
        CgroupResource::v1(R::MEMORY_WMARK_RATIO, "memory", "memory.wmark_ratio")
            .with_validator(V::range(0, 100)),
        CgroupResource::v1(R::MEMORY_WMARK_SCALE_FACTOR, "memory", "memory.wmark_scale_factor")
            .with_validator(V::range(1, 1_000)),
        CgroupResource::v1(R::MEMORY_WMARK_MIN_ADJ, "memory", "memory.wmark_min_adj")
            .with_validator(V::range(-25, 50)),
        CgroupResource::v1(R::MEMORY_PRIORITY, "memory", "memory.priority")
            .with_validator(V::range(0, 12)),
        CgroupResource::v1(R::MEMORY_USE_PRIORITY_OOM, "memory", "memory.use_priority_oom")
            .with_validator(V::range(0, 1)),
        CgroupResource::v1(R::MEMORY_OOM_GROUP, "memory", "memory.oom.group")
            .with_validator(V::range(0, 1)),
        CgroupResource::v1(R::BLKIO_READ_IOPS, "blkio", "blkio.throttle.read_iops_device"),
        CgroupResource::v1(R::BLKIO_READ_BPS, "blkio", "blkio.throttle.read_bps_device"),
        CgroupResource::v1(R::BLKIO_WRITE_IOPS, "blkio", "blkio.throttle.write_iops_device"),
        CgroupResource::v1(R::BLKIO_WRITE_BPS, "blkio", "blkio.throttle.write_bps_device"),
    ]
}

// Only kinds with a one-to-one unified-hierarchy file; quota/period share
// `cpu.max` and blkio maps to `io.max`, both of which need value translation.
fn default_v2_resources() -> Vec<CgroupResource> {
    type V = ResourceValidator;
    type R = ResourceType;

    let bytes_or_max = V::Range {
        min: 0,
        max: i64::MAX,
        allow_max: true,
    };

    vec![
        CgroupResource::v2(R::CPU_SHARES, "cpu.weight").with_validator(V::range(1, 10_000)),
        CgroupResource::v2(R::CPU_TASKS, "cgroup.threads"),
        CgroupResource::v2(R::CPUSET_CPUS, "cpuset.cpus").with_validator(V::CpuSet),
        CgroupResource::v2(R::MEMORY_LIMIT, "memory.max").with_validator(bytes_or_max),
        CgroupResource::v2(R::MEMORY_USAGE, "memory.current"),
        CgroupResource::v2(R::MEMORY_MIN, "memory.min").with_validator(bytes_or_max),
        CgroupResource::v2(R::MEMORY_LOW, "memory.low").with_validator(bytes_or_max),
        CgroupResource::v2(R::MEMORY_HIGH, "memory.high").with_validator(bytes_or_max),
        CgroupResource::v2(R::MEMORY_OOM_GROUP, "memory.oom.group")
            .with_validator(V::range(0, 1)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_new_empty() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn registry_with_defaults_v1() {
        let registry = ResourceRegistry::with_defaults();
        for kind in [
            ResourceType::CPU_SHARES,
            ResourceType::MEMORY_MIN,
            ResourceType::CPUSET_CPUS,
            ResourceType::BLKIO_WRITE_BPS,
        ] {
            assert!(registry.contains(CgroupVersion::V1, &kind), "{kind}");
        }
    }

    #[test]
    fn registry_v2_maps_files() {
        let registry = ResourceRegistry::with_defaults();
        let limit = registry
            .get(CgroupVersion::V2, &ResourceType::MEMORY_LIMIT)
            .unwrap();
        assert_eq!(limit.file_name(), "memory.max");
        assert_eq!(limit.resource_type(), &ResourceType::MEMORY_LIMIT);
    }

    #[test]
    fn registry_v2_lacks_translated_kinds() {
        let registry = ResourceRegistry::with_defaults();
        assert!(registry
            .get(CgroupVersion::V2, &ResourceType::CPU_CFS_QUOTA)
            .is_none());
        assert!(registry
            .get(CgroupVersion::V2, &ResourceType::BLKIO_READ_IOPS)
            .is_none());
    }

    #[test]
    fn registry_add_replaces() {
        let mut registry = ResourceRegistry::new();
        registry.add(CgroupResource::v1(ResourceType::MEMORY_MIN, "memory", "memory.min"));
        registry.add(
            CgroupResource::v1(ResourceType::MEMORY_MIN, "memory", "memory.min")
                .with_validator(ResourceValidator::range(0, 10)),
        );
        assert_eq!(registry.len(), 1);
        let r = registry
            .get(CgroupVersion::V1, &ResourceType::MEMORY_MIN)
            .unwrap();
        assert!(r.is_valid("11").is_err());
    }
}
