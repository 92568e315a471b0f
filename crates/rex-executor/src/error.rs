//! Error types for REX Executor
//!
//! Provides error handling for:
//! - Updater construction (unregistered or unknown resource kinds)
//! - Value validation before a merge
//! - Kernel interface read/write failures, with path context
//! - Merge-condition evaluation on malformed values
//! - Configuration loading

use rex_system::{CgroupVersion, ResourceType, SystemError};
use std::fmt;
use std::path::PathBuf;

/// Resource updater error
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// No constructor registered for the kind
    #[error("resource type {kind} not registered")]
    NotRegistered {
        /// Requested kind
        kind: ResourceType,
    },

    /// Kind unknown to the resource descriptor registry
    #[error("{kind} not found in cgroup registry ({version})")]
    NotFound {
        /// Requested kind
        kind: ResourceType,
        /// Cgroup version searched
        version: CgroupVersion,
    },

    /// No sandbox transport configured
    #[error("no sandbox file access configured for sandbox {sandbox_id}")]
    SandboxUnavailable {
        /// Requested sandbox
        sandbox_id: String,
    },

    /// Only cgroup updaters can be routed through a sandbox
    #[error("resource type {kind} is not a cgroup resource and cannot be sandboxed")]
    Unsandboxable {
        /// Requested kind
        kind: ResourceType,
    },

    /// Pending value rejected by the resource's validity rule
    #[error("parse new value failed for {}: {message}", path.display())]
    InvalidValue {
        /// Target file
        path: PathBuf,
        /// Validator message
        message: String,
    },

    /// Reading the current value failed
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: SystemError,
    },

    /// Writing the value failed
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: SystemError,
    },

    /// Merge condition could not compare the values
    #[error("check merge condition for {} failed: {source}", path.display())]
    Policy {
        /// Target file
        path: PathBuf,
        /// Condition error
        #[source]
        source: MergeConditionError,
    },
}

impl UpdaterError {
    /// Check if error happened while constructing an updater
    #[inline]
    #[must_use]
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered { .. }
                | Self::NotFound { .. }
                | Self::SandboxUnavailable { .. }
                | Self::Unsandboxable { .. }
        )
    }

    /// Check if error came from the kernel interface
    #[inline]
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }
}

/// Which side of a merge failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSide {
    /// Value currently stored in the file
    Old,

    /// Requested value
    New,
}

impl fmt::Display for ValueSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => f.write_str("old"),
            Self::New => f.write_str("new"),
        }
    }
}

/// Merge condition evaluation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{side} value {value:?} is not {expected}: {reason}")]
pub struct MergeConditionError {
    /// Failing side
    pub side: ValueSide,
    /// Offending value
    pub value: String,
    /// Expected value shape, e.g. `int64`
    pub expected: &'static str,
    /// Parser message
    pub reason: String,
}

impl MergeConditionError {
    /// Create error for one side
    #[inline]
    #[must_use]
    pub fn new(
        side: ValueSide,
        value: &str,
        expected: &'static str,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            side,
            value: value.to_string(),
            expected,
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config is not valid TOML for [`ExecutorConfig`](crate::ExecutorConfig)
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Cgroup version cannot be detected
    #[error("cannot detect cgroup version, {} is not a directory", root.display())]
    Detect {
        /// Configured hierarchy root
        root: PathBuf,
    },
}
