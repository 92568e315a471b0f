//! REX Executor
//!
//! Write path for per-workload resource limits:
//! - Resource updaters for cgroup files, plain system files and sandboxed cgroups
//! - Write-if-different plain updates
//! - Merge updates that only widen hierarchical resources (`memory.min`,
//!   `cpuset.cpus`, ...) so a parent never ends up narrower than a child
//! - A kind-to-constructor factory shared across threads
//! - Best-effort audit of every write
//!
//! # Example
//!
//! ```rust,ignore
//! use rex_executor::{ExecutorConfig, UpdaterFactory};
//! use rex_system::ResourceType;
//!
//! let env = ExecutorConfig::new().build_env()?;
//! let factory = UpdaterFactory::with_defaults(env);
//!
//! // Top-down: widen the parent before the child gets its value
//! let parent = factory.new_updater(&ResourceType::CPUSET_CPUS, "kubepods", "0-7")?;
//! let outcome = parent.merge_update()?;
//! println!("effective {} (written: {})", outcome.value(), outcome.written);
//!
//! // Bottom-up: settle on the exact value
//! parent.update()?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod audit;
pub mod config;
pub mod env;
pub mod error;
pub mod factory;
pub mod merge;
pub mod updater;

// Re-exports
pub use audit::{
    AuditError, AuditEvent, AuditSink, Auditor, MemoryAuditSink, TracingAuditSink,
    REASON_UPDATE_CGROUPS, REASON_UPDATE_SYSTEM_CONFIG, UPDATE_VERBOSITY,
};
pub use config::{AuditConfig, ExecutorConfig};
pub use env::UpdaterEnv;
pub use error::{ConfigError, MergeConditionError, UpdaterError, ValueSide};
pub use factory::{
    default_factory, init_default_factory, register_default_updaters, NewUpdaterFn,
    UpdaterFactory,
};
pub use merge::{IfCpuSetLooser, IfValueLarger, MergeCondition, MergeDecision};
pub use updater::{
    new_common_cgroup_updater, new_common_default_updater,
    new_mergeable_cgroup_updater_if_cpuset_looser, new_mergeable_cgroup_updater_if_value_larger,
    new_mergeable_cgroup_updater_with_condition, new_sandboxed_cgroup_updater, CgroupUpdater,
    DefaultUpdater, MergeOutcome, ResourceUpdater, SandboxedCgroupUpdater,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
