//! REX CPU Sets
//!
//! CPU index sets in the Linux "cpulist" notation used by `cpuset.cpus`.
//!
//! # Core Concepts
//!
//! - [`CpuSet`]: Ordered set of CPU indices with subset/union algebra
//! - [`CpuSetError`]: Parse failures with the offending token
//!
//! # Example
//!
//! ```rust
//! use rex_cpuset::CpuSet;
//!
//! let old: CpuSet = "0-3".parse().unwrap();
//! let new: CpuSet = "2-5".parse().unwrap();
//!
//! assert!(!new.is_subset_of(&old));
//! assert_eq!(old.union(&new).to_string(), "0-5");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod set;

pub use set::{CpuSet, CpuSetError, MAX_CPUS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
