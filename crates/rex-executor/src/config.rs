//! Executor configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! cgroup_root = "/sys/fs/cgroup"
//! cgroup_version = "v2"
//!
//! [audit]
//! enabled = true
//! capacity = 1024
//! max_verbosity = 5
//! ```

use crate::audit::{Auditor, MemoryAuditSink, TracingAuditSink, UPDATE_VERBOSITY};
use crate::env::UpdaterEnv;
use crate::error::ConfigError;
use rex_system::CgroupVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default cgroup hierarchy mount point
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Cgroup hierarchy root
    pub cgroup_root: PathBuf,
    /// Cgroup version; detected from the hierarchy when absent
    pub cgroup_version: Option<CgroupVersion>,
    /// Audit settings
    pub audit: AuditConfig,
}

impl ExecutorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cgroup root
    #[inline]
    #[must_use]
    pub fn with_cgroup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cgroup_root = root.into();
        self
    }

    /// With explicit cgroup version
    #[inline]
    #[must_use]
    pub fn with_cgroup_version(mut self, version: CgroupVersion) -> Self {
        self.cgroup_version = Some(version);
        self
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] on malformed content.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Effective cgroup version
    ///
    /// # Errors
    /// Returns [`ConfigError::Detect`] if detection is needed and the root
    /// is not a directory.
    pub fn resolve_cgroup_version(&self) -> Result<CgroupVersion, ConfigError> {
        if let Some(version) = self.cgroup_version {
            return Ok(version);
        }
        if !self.cgroup_root.is_dir() {
            return Err(ConfigError::Detect {
                root: self.cgroup_root.clone(),
            });
        }
        Ok(CgroupVersion::detect(&self.cgroup_root))
    }

    /// Build the updater environment on the host file system
    ///
    /// # Errors
    /// Returns [`ConfigError::Detect`] if the cgroup version cannot be
    /// determined.
    pub fn build_env(&self) -> Result<UpdaterEnv, ConfigError> {
        let version = self.resolve_cgroup_version()?;
        tracing::debug!(
            "building updater env, cgroup root {} ({})",
            self.cgroup_root.display(),
            version
        );
        Ok(UpdaterEnv::new(&self.cgroup_root, version).with_auditor(self.audit.build_auditor()))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            cgroup_version: None,
            audit: AuditConfig::default(),
        }
    }
}

/// Audit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit audit events
    pub enabled: bool,
    /// Events retained in memory; 0 logs only
    pub capacity: usize,
    /// Noisiest verbosity kept
    pub max_verbosity: u8,
}

impl AuditConfig {
    /// Build the auditor described by this config
    #[must_use]
    pub fn build_auditor(&self) -> Auditor {
        if !self.enabled {
            return Auditor::disabled();
        }
        if self.capacity == 0 {
            return Auditor::new(Arc::new(TracingAuditSink::new(self.max_verbosity)));
        }
        Auditor::new(Arc::new(MemoryAuditSink::new(
            self.capacity,
            self.max_verbosity,
        )))
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
            max_verbosity: UPDATE_VERBOSITY,
        }
    }
}
