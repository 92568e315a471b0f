//! Shared collaborators for updater construction

use crate::audit::Auditor;
use rex_system::{
    CgroupFs, CgroupVersion, FileAccess, HostFileAccess, ResourceRegistry, SandboxFileAccess,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything an updater needs besides its own target and value
///
/// Cloning is cheap; updaters keep a copy of the pieces they use.
#[derive(Debug, Clone)]
pub struct UpdaterEnv {
    resources: Arc<ResourceRegistry>,
    cgroup_fs: CgroupFs,
    host: Arc<dyn FileAccess>,
    sandbox: Option<Arc<dyn SandboxFileAccess>>,
    auditor: Auditor,
}

impl UpdaterEnv {
    /// Create environment over the given hierarchy with built-in resources
    #[must_use]
    pub fn new(cgroup_root: impl Into<PathBuf>, version: CgroupVersion) -> Self {
        let host: Arc<dyn FileAccess> = Arc::new(HostFileAccess);
        Self {
            resources: Arc::new(ResourceRegistry::with_defaults()),
            cgroup_fs: CgroupFs::new(cgroup_root, version, host.clone()),
            host,
            sandbox: None,
            auditor: Auditor::disabled(),
        }
    }

    /// Create environment from prebuilt cgroup primitives
    ///
    /// Plain (non-cgroup) files go through the same file access.
    #[must_use]
    pub fn from_cgroup_fs(cgroup_fs: CgroupFs) -> Self {
        Self {
            resources: Arc::new(ResourceRegistry::with_defaults()),
            host: cgroup_fs.access().clone(),
            cgroup_fs,
            sandbox: None,
            auditor: Auditor::disabled(),
        }
    }

    /// With resource descriptor registry
    #[inline]
    #[must_use]
    pub fn with_resources(mut self, resources: Arc<ResourceRegistry>) -> Self {
        self.resources = resources;
        self
    }

    /// With auditor
    #[inline]
    #[must_use]
    pub fn with_auditor(mut self, auditor: Auditor) -> Self {
        self.auditor = auditor;
        self
    }

    /// With sandbox transport for sandboxed updaters
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxFileAccess>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Resource descriptor registry
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Cgroup primitives on the host
    #[inline]
    #[must_use]
    pub fn cgroup_fs(&self) -> &CgroupFs {
        &self.cgroup_fs
    }

    /// File access for plain system files
    #[inline]
    #[must_use]
    pub fn host_access(&self) -> &Arc<dyn FileAccess> {
        &self.host
    }

    /// Sandbox transport, if configured
    #[inline]
    #[must_use]
    pub fn sandbox(&self) -> Option<&Arc<dyn SandboxFileAccess>> {
        self.sandbox.as_ref()
    }

    /// Auditor
    #[inline]
    #[must_use]
    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    /// Cgroup version of the hierarchy
    #[inline]
    #[must_use]
    pub fn cgroup_version(&self) -> CgroupVersion {
        self.cgroup_fs.version()
    }
}
