//! Updater factory
//!
//! Maps resource kinds to updater constructors. The map is filled once
//! during startup and read concurrently afterwards.

use crate::env::UpdaterEnv;
use crate::error::UpdaterError;
use crate::updater::{
    new_common_cgroup_updater, new_mergeable_cgroup_updater_if_cpuset_looser,
    new_mergeable_cgroup_updater_if_value_larger, ResourceUpdater,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rex_system::ResourceType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Constructor for one family of resource kinds
///
/// Arguments are the environment, kind, cgroup directory and pending value.
pub type NewUpdaterFn = Arc<
    dyn Fn(&UpdaterEnv, &ResourceType, &str, &str) -> Result<ResourceUpdater, UpdaterError>
        + Send
        + Sync,
>;

/// Kinds created without merge condition
pub const COMMON_KINDS: [ResourceType; 18] = [
    ResourceType::CPU_SHARES,
    ResourceType::CPU_CFS_QUOTA,
    ResourceType::CPU_CFS_PERIOD,
    ResourceType::CPU_BURST,
    ResourceType::CPU_TASKS,
    ResourceType::CPU_BVT_WARP_NS,
    ResourceType::MEMORY_LIMIT,
    ResourceType::MEMORY_USAGE,
    ResourceType::MEMORY_WMARK_RATIO,
    ResourceType::MEMORY_WMARK_SCALE_FACTOR,
    ResourceType::MEMORY_WMARK_MIN_ADJ,
    ResourceType::MEMORY_PRIORITY,
    ResourceType::MEMORY_USE_PRIORITY_OOM,
    ResourceType::MEMORY_OOM_GROUP,
    ResourceType::BLKIO_READ_IOPS,
    ResourceType::BLKIO_READ_BPS,
    ResourceType::BLKIO_WRITE_IOPS,
    ResourceType::BLKIO_WRITE_BPS,
];

/// Kinds that only grow on merge
pub const VALUE_LARGER_KINDS: [ResourceType; 3] = [
    ResourceType::MEMORY_MIN,
    ResourceType::MEMORY_LOW,
    ResourceType::MEMORY_HIGH,
];

/// Kinds whose cpuset only widens on merge
pub const CPUSET_LOOSER_KINDS: [ResourceType; 1] = [ResourceType::CPUSET_CPUS];

static DEFAULT_FACTORY: OnceCell<UpdaterFactory> = OnceCell::new();

/// Registry of updater constructors keyed by resource kind
pub struct UpdaterFactory {
    env: UpdaterEnv,
    registry: RwLock<HashMap<ResourceType, NewUpdaterFn>>,
}

impl fmt::Debug for UpdaterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterFactory")
            .field("env", &self.env)
            .field("kinds", &self.registry.read().len())
            .finish()
    }
}

impl UpdaterFactory {
    /// Create empty factory
    #[must_use]
    pub fn new(env: UpdaterEnv) -> Self {
        Self {
            env,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Create factory with the built-in constructors
    #[must_use]
    pub fn with_defaults(env: UpdaterEnv) -> Self {
        let factory = Self::new(env);
        register_default_updaters(&factory);
        factory
    }

    /// Register `constructor` for each of `kinds`
    ///
    /// The first registration of a kind wins; later ones are ignored.
    pub fn register<F>(&self, constructor: F, kinds: &[ResourceType])
    where
        F: Fn(&UpdaterEnv, &ResourceType, &str, &str) -> Result<ResourceUpdater, UpdaterError>
            + Send
            + Sync
            + 'static,
    {
        let constructor: NewUpdaterFn = Arc::new(constructor);
        let mut registry = self.registry.write();
        for kind in kinds {
            if registry.contains_key(kind) {
                tracing::debug!("resource type {} already registered, ignored", kind);
                continue;
            }
            registry.insert(kind.clone(), Arc::clone(&constructor));
        }
    }

    /// Create an updater for `kind` in cgroup `parent_dir`
    ///
    /// # Errors
    /// Returns [`UpdaterError::NotRegistered`] for unknown kinds, or the
    /// constructor's error.
    pub fn new_updater(
        &self,
        kind: &ResourceType,
        parent_dir: &str,
        value: &str,
    ) -> Result<ResourceUpdater, UpdaterError> {
        let constructor = self.constructor(kind)?;
        constructor(&self.env, kind, parent_dir, value)
    }

    /// Create an updater for `kind` and route it through `sandbox_id`
    ///
    /// The registered constructor decides the merge condition; file access
    /// goes through the environment's sandbox transport.
    ///
    /// # Errors
    /// Returns [`UpdaterError::NotRegistered`] for unknown kinds,
    /// [`UpdaterError::SandboxUnavailable`] without a transport, or the
    /// constructor's error.
    pub fn new_sandboxed_updater(
        &self,
        kind: &ResourceType,
        parent_dir: &str,
        value: &str,
        sandbox_id: &str,
    ) -> Result<ResourceUpdater, UpdaterError> {
        let Some(transport) = self.env.sandbox().cloned() else {
            return Err(UpdaterError::SandboxUnavailable {
                sandbox_id: sandbox_id.to_string(),
            });
        };
        self.new_updater(kind, parent_dir, value)?
            .into_sandboxed(sandbox_id, transport)
    }

    /// Check if `kind` has a constructor
    #[inline]
    #[must_use]
    pub fn contains(&self, kind: &ResourceType) -> bool {
        self.registry.read().contains_key(kind)
    }

    /// Number of registered kinds
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// Check if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<ResourceType> {
        let mut kinds: Vec<_> = self.registry.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Environment handed to constructors
    #[inline]
    #[must_use]
    pub fn env(&self) -> &UpdaterEnv {
        &self.env
    }

    fn constructor(&self, kind: &ResourceType) -> Result<NewUpdaterFn, UpdaterError> {
        self.registry
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| UpdaterError::NotRegistered { kind: kind.clone() })
    }
}

/// Register the built-in constructor table
pub fn register_default_updaters(factory: &UpdaterFactory) {
    factory.register(new_common_cgroup_updater, &COMMON_KINDS);
    factory.register(new_mergeable_cgroup_updater_if_value_larger, &VALUE_LARGER_KINDS);
    factory.register(new_mergeable_cgroup_updater_if_cpuset_looser, &CPUSET_LOOSER_KINDS);
}

/// Install the process-wide factory with the built-in constructors
///
/// Only the first call installs; later calls return the existing factory.
pub fn init_default_factory(env: UpdaterEnv) -> &'static UpdaterFactory {
    DEFAULT_FACTORY.get_or_init(|| UpdaterFactory::with_defaults(env))
}

/// Process-wide factory, if [`init_default_factory`] ran
#[inline]
#[must_use]
pub fn default_factory() -> Option<&'static UpdaterFactory> {
    DEFAULT_FACTORY.get()
}
