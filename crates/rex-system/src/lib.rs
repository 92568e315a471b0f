//! REX System Layer
//!
//! Knowledge of the kernel interface that resource updaters write through.
//!
//! # Overview
//!
//! - **ResourceType**: Identity of one kernel tunable (`cpu.shares`, `memory.min`, ...)
//! - **CgroupResource**: Descriptor mapping a resource type to its file and validity rule
//! - **ResourceRegistry**: Lookup of descriptors per cgroup version
//! - **FileAccess**: Seam for reading/writing interface files (host or sandboxed)
//! - **CgroupFs**: Read/write primitives resolved under a cgroup root
//!
//! # Example
//!
//! ```rust,ignore
//! use rex_system::{CgroupFs, CgroupVersion, HostFileAccess, ResourceRegistry, ResourceType};
//! use std::sync::Arc;
//!
//! let registry = ResourceRegistry::with_defaults();
//! let fs = CgroupFs::new("/sys/fs/cgroup", CgroupVersion::V1, Arc::new(HostFileAccess));
//!
//! let resource = registry.get(CgroupVersion::V1, &ResourceType::MEMORY_MIN).unwrap();
//! let current = fs.read("kubepods/pod1", &resource)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod access;
pub mod cgroup;
pub mod error;
pub mod registry;
pub mod resource;

// Re-exports
pub use access::{FileAccess, HostFileAccess, SandboxBoundAccess, SandboxFileAccess};
pub use cgroup::{common_file_write_if_different, CgroupFs, CgroupVersion};
pub use error::SystemError;
pub use registry::ResourceRegistry;
pub use resource::{CgroupResource, ResourceType, ResourceValidator};

/// Kernel rendering of an unlimited value (page-aligned `i64::MAX`)
pub const CGROUP_MAX_VALUE_STR: &str = "9223372036854771712";

/// Unaligned `i64::MAX`, how callers usually spell an unlimited limit
pub const CGROUP_INT64_MAX_STR: &str = "9223372036854775807";

/// Symbolic unlimited value accepted by cgroup-v2 files
pub const CGROUP_MAX_SYMBOL_STR: &str = "max";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
