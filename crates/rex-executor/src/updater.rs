//! Resource updaters
//!
//! A [`ResourceUpdater`] carries one pending value for one kernel interface
//! file and knows how to apply it. Three variants share the contract:
//!
//! - [`CgroupUpdater`]: a known cgroup resource under a cgroup directory
//! - [`DefaultUpdater`]: an arbitrary system file (`dir/file`)
//! - [`SandboxedCgroupUpdater`]: a cgroup updater whose file access runs
//!   inside a sandbox
//!
//! # Merge updates
//!
//! Cgroup interfaces such as `cpuset.cpus` and `memory.min` must stay at
//! least as broad at an ancestor as at any descendant. A caller reconciling
//! a tree first walks it top-down with [`ResourceUpdater::merge_update`],
//! which only ever widens the stored value, then bottom-up with
//! [`ResourceUpdater::update`], which writes the exact desired value.

use crate::audit::{Auditor, REASON_UPDATE_CGROUPS, REASON_UPDATE_SYSTEM_CONFIG, UPDATE_VERBOSITY};
use crate::env::UpdaterEnv;
use crate::error::UpdaterError;
use crate::merge::{IfCpuSetLooser, IfValueLarger, MergeCondition};
use chrono::{DateTime, Utc};
use rex_system::{
    common_file_write_if_different, CgroupFs, CgroupResource, FileAccess, ResourceType,
    SandboxBoundAccess, SandboxFileAccess,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Updater for one resource file
///
/// Cloning copies the pending value and timestamp; strategy objects
/// (file access, merge condition, auditor) are shared.
#[derive(Debug, Clone)]
pub enum ResourceUpdater {
    /// Cgroup resource on the host
    Cgroup(CgroupUpdater),

    /// Plain system file
    Default(DefaultUpdater),

    /// Cgroup resource reached through a sandbox
    Sandboxed(SandboxedCgroupUpdater),
}

/// Result of [`ResourceUpdater::merge_update`]
#[derive(Debug)]
pub struct MergeOutcome<'a> {
    /// Authoritative post-merge updater
    ///
    /// Borrowed when the receiver's value was applied; owned when the write
    /// was skipped, holding the value found in the file.
    pub updater: Cow<'a, ResourceUpdater>,

    /// Whether the file was written
    pub written: bool,
}

impl MergeOutcome<'_> {
    /// Effective value after the merge
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        self.updater.value()
    }

    /// Detach from the receiver
    #[inline]
    #[must_use]
    pub fn into_owned(self) -> ResourceUpdater {
        self.updater.into_owned()
    }
}

impl ResourceUpdater {
    /// Resource identity
    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        match self {
            Self::Cgroup(u) => u.resource_type(),
            Self::Default(u) => &u.resource_type,
            Self::Sandboxed(u) => u.inner.resource_type(),
        }
    }

    /// Resolved target file
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Cgroup(u) => &u.path,
            Self::Default(u) => &u.path,
            Self::Sandboxed(u) => &u.inner.path,
        }
    }

    /// Pending value
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Cgroup(u) => &u.value,
            Self::Default(u) => &u.value,
            Self::Sandboxed(u) => &u.inner.value,
        }
    }

    /// Replace the pending value
    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        match self {
            Self::Cgroup(u) => u.value = value,
            Self::Default(u) => u.value = value,
            Self::Sandboxed(u) => u.inner.value = value,
        }
    }

    /// Time of the last successful update, as recorded by the caller
    #[must_use]
    pub fn last_update_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Cgroup(u) => u.last_update,
            Self::Default(u) => u.last_update,
            Self::Sandboxed(u) => u.inner.last_update,
        }
    }

    /// Record the time of the last successful update
    pub fn set_last_update_timestamp(&mut self, timestamp: DateTime<Utc>) {
        let slot = match self {
            Self::Cgroup(u) => &mut u.last_update,
            Self::Default(u) => &mut u.last_update,
            Self::Sandboxed(u) => &mut u.inner.last_update,
        };
        *slot = Some(timestamp);
    }

    /// Whether [`merge_update`](Self::merge_update) applies a merge condition
    #[must_use]
    pub fn is_mergeable(&self) -> bool {
        match self {
            Self::Cgroup(u) => u.merge_condition.is_some(),
            Self::Default(_) => false,
            Self::Sandboxed(u) => u.inner.merge_condition.is_some(),
        }
    }

    /// Sandbox the updater runs in, if any
    #[must_use]
    pub fn sandbox_id(&self) -> Option<&str> {
        match self {
            Self::Sandboxed(u) => Some(&u.sandbox_id),
            Self::Cgroup(_) | Self::Default(_) => None,
        }
    }

    /// Write the pending value unless the file already holds it
    ///
    /// Returns whether a write happened.
    ///
    /// # Errors
    /// Returns [`UpdaterError::Write`] if the file cannot be read or written.
    pub fn update(&self) -> Result<bool, UpdaterError> {
        self.apply()
    }

    /// Merge the pending value with the stored one
    ///
    /// Validates the pending value, reads the stored value, and asks the
    /// merge condition what the file should hold:
    ///
    /// - no write needed: returns an owned clone whose value is the stored
    ///   value; nothing is written or audited
    /// - write needed: writes the merged value once and returns `self`
    ///
    /// Updaters without a merge condition behave like
    /// [`update`](Self::update) and return `self`. The receiver is never
    /// modified.
    ///
    /// # Errors
    /// - [`UpdaterError::InvalidValue`] if the pending value is rejected
    /// - [`UpdaterError::Read`] if the stored value cannot be read
    /// - [`UpdaterError::Policy`] if either value cannot be compared
    /// - [`UpdaterError::Write`] if writing the merged value fails
    pub fn merge_update(&self) -> Result<MergeOutcome<'_>, UpdaterError> {
        let cgroup = match self {
            Self::Cgroup(u) => u,
            Self::Sandboxed(u) => &u.inner,
            Self::Default(_) => return self.fallback_merge(),
        };
        let Some(condition) = &cgroup.merge_condition else {
            return self.fallback_merge();
        };

        match cgroup.merge(condition.as_ref())? {
            MergeResolution::Written => Ok(MergeOutcome {
                updater: Cow::Borrowed(self),
                written: true,
            }),
            MergeResolution::Skipped { current } => {
                let mut merged = self.clone();
                merged.set_value(current);
                Ok(MergeOutcome {
                    updater: Cow::Owned(merged),
                    written: false,
                })
            }
        }
    }

    /// Route a cgroup updater through a sandbox
    ///
    /// # Errors
    /// Returns [`UpdaterError::Unsandboxable`] for plain file updaters.
    pub fn into_sandboxed(
        self,
        sandbox_id: impl Into<String>,
        transport: Arc<dyn SandboxFileAccess>,
    ) -> Result<Self, UpdaterError> {
        match self {
            Self::Cgroup(u) => Ok(Self::Sandboxed(u.sandboxed(sandbox_id, transport))),
            Self::Sandboxed(u) => Ok(Self::Sandboxed(u.inner.sandboxed(sandbox_id, transport))),
            Self::Default(u) => Err(UpdaterError::Unsandboxable {
                kind: u.resource_type,
            }),
        }
    }

    fn apply(&self) -> Result<bool, UpdaterError> {
        match self {
            Self::Cgroup(u) => u.apply(),
            Self::Default(u) => u.apply(),
            Self::Sandboxed(u) => u.inner.apply(),
        }
    }

    fn fallback_merge(&self) -> Result<MergeOutcome<'_>, UpdaterError> {
        let written = self.apply()?;
        Ok(MergeOutcome {
            updater: Cow::Borrowed(self),
            written,
        })
    }
}

enum MergeResolution {
    Written,
    Skipped { current: String },
}

/// Updater for a known cgroup resource
#[derive(Debug, Clone)]
pub struct CgroupUpdater {
    resource: Arc<CgroupResource>,
    parent_dir: String,
    path: PathBuf,
    value: String,
    last_update: Option<DateTime<Utc>>,
    fs: CgroupFs,
    auditor: Auditor,
    merge_condition: Option<Arc<dyn MergeCondition>>,
}

impl CgroupUpdater {
    fn new(
        env: &UpdaterEnv,
        kind: &ResourceType,
        parent_dir: &str,
        value: &str,
        merge_condition: Option<Arc<dyn MergeCondition>>,
    ) -> Result<Self, UpdaterError> {
        let version = env.cgroup_version();
        let resource = env
            .resources()
            .get(version, kind)
            .ok_or_else(|| UpdaterError::NotFound {
                kind: kind.clone(),
                version,
            })?;
        let fs = env.cgroup_fs().clone();

        Ok(Self {
            path: fs.resolve(parent_dir, &resource),
            resource,
            parent_dir: parent_dir.to_string(),
            value: value.to_string(),
            last_update: None,
            fs,
            auditor: env.auditor().clone(),
            merge_condition,
        })
    }

    /// Resource identity
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> &ResourceType {
        self.resource.resource_type()
    }

    /// Resource descriptor
    #[inline]
    #[must_use]
    pub fn resource(&self) -> &CgroupResource {
        &self.resource
    }

    /// Cgroup directory relative to the hierarchy root
    #[inline]
    #[must_use]
    pub fn parent_dir(&self) -> &str {
        &self.parent_dir
    }

    /// Merge condition, if any
    #[inline]
    #[must_use]
    pub fn merge_condition(&self) -> Option<&dyn MergeCondition> {
        self.merge_condition.as_deref()
    }

    /// Rebind file access to a sandbox
    #[must_use]
    pub fn sandboxed(
        mut self,
        sandbox_id: impl Into<String>,
        transport: Arc<dyn SandboxFileAccess>,
    ) -> SandboxedCgroupUpdater {
        let sandbox_id = sandbox_id.into();
        let access: Arc<dyn FileAccess> =
            Arc::new(SandboxBoundAccess::new(sandbox_id.clone(), transport));
        self.fs = self.fs.with_access(access);
        SandboxedCgroupUpdater {
            inner: self,
            sandbox_id,
        }
    }

    fn apply(&self) -> Result<bool, UpdaterError> {
        audit_update(&self.auditor, REASON_UPDATE_CGROUPS, &self.path, &self.value);
        self.fs
            .write_if_different(&self.parent_dir, &self.resource, &self.value)
            .map_err(|source| UpdaterError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn merge(&self, condition: &dyn MergeCondition) -> Result<MergeResolution, UpdaterError> {
        if let Err(message) = self.resource.is_valid(&self.value) {
            tracing::trace!(
                "failed to merge update cgroup {}, invalid new value: {}",
                self.path.display(),
                message
            );
            return Err(UpdaterError::InvalidValue {
                path: self.path.clone(),
                message,
            });
        }

        let old = self
            .fs
            .read(&self.parent_dir, &self.resource)
            .map_err(|source| {
                tracing::trace!(
                    "failed to merge update cgroup {}, read old value err: {}",
                    self.path.display(),
                    source
                );
                UpdaterError::Read {
                    path: self.path.clone(),
                    source,
                }
            })?;

        let decision = condition.evaluate(&old, &self.value).map_err(|source| {
            tracing::trace!(
                "failed to merge update cgroup {}, check merge condition {} err: {}",
                self.path.display(),
                condition.name(),
                source
            );
            UpdaterError::Policy {
                path: self.path.clone(),
                source,
            }
        })?;

        if !decision.need_write {
            tracing::trace!(
                "skip merge update cgroup {} since no need to merge new value[{}] with old[{}]",
                self.path.display(),
                self.value,
                old
            );
            return Ok(MergeResolution::Skipped { current: old });
        }

        tracing::trace!(
            "merge update cgroup {} with merged value[{}], original new[{}], old[{}]",
            self.path.display(),
            decision.value,
            self.value,
            old
        );
        audit_update(&self.auditor, REASON_UPDATE_CGROUPS, &self.path, &decision.value);
        self.fs
            .write(&self.parent_dir, &self.resource, &decision.value)
            .map_err(|source| UpdaterError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(MergeResolution::Written)
    }
}

/// Updater for a plain system file such as a sysctl
#[derive(Debug, Clone)]
pub struct DefaultUpdater {
    resource_type: ResourceType,
    dir: PathBuf,
    file: String,
    path: PathBuf,
    value: String,
    last_update: Option<DateTime<Utc>>,
    access: Arc<dyn FileAccess>,
    auditor: Auditor,
}

impl DefaultUpdater {
    /// Directory holding the file
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name
    #[inline]
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    fn apply(&self) -> Result<bool, UpdaterError> {
        audit_update(&self.auditor, REASON_UPDATE_SYSTEM_CONFIG, &self.path, &self.value);
        common_file_write_if_different(self.access.as_ref(), &self.path, &self.value).map_err(
            |source| UpdaterError::Write {
                path: self.path.clone(),
                source,
            },
        )
    }
}

/// Cgroup updater whose file access runs inside a sandbox
#[derive(Debug, Clone)]
pub struct SandboxedCgroupUpdater {
    inner: CgroupUpdater,
    sandbox_id: String,
}

impl SandboxedCgroupUpdater {
    /// Sandbox identity
    #[inline]
    #[must_use]
    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    /// Wrapped cgroup updater
    #[inline]
    #[must_use]
    pub fn cgroup(&self) -> &CgroupUpdater {
        &self.inner
    }
}

fn audit_update(auditor: &Auditor, reason: &str, path: &Path, value: &str) {
    let result = auditor
        .v(UPDATE_VERBOSITY)
        .reason(reason)
        .message(format!("update {} to {}", path.display(), value))
        .record();
    if let Err(err) = result {
        tracing::trace!("failed to audit update of {}: {}", path.display(), err);
    }
}

/// Create a cgroup updater without merge condition
///
/// # Errors
/// Returns [`UpdaterError::NotFound`] if the kind has no descriptor for the
/// environment's cgroup version.
pub fn new_common_cgroup_updater(
    env: &UpdaterEnv,
    kind: &ResourceType,
    parent_dir: &str,
    value: &str,
) -> Result<ResourceUpdater, UpdaterError> {
    CgroupUpdater::new(env, kind, parent_dir, value, None).map(ResourceUpdater::Cgroup)
}

/// Create a cgroup updater merging through `condition`
///
/// # Errors
/// Returns [`UpdaterError::NotFound`] if the kind has no descriptor for the
/// environment's cgroup version.
pub fn new_mergeable_cgroup_updater_with_condition(
    env: &UpdaterEnv,
    kind: &ResourceType,
    parent_dir: &str,
    value: &str,
    condition: Arc<dyn MergeCondition>,
) -> Result<ResourceUpdater, UpdaterError> {
    CgroupUpdater::new(env, kind, parent_dir, value, Some(condition)).map(ResourceUpdater::Cgroup)
}

/// Create a cgroup updater that only raises integer values on merge
///
/// # Errors
/// Returns [`UpdaterError::NotFound`] if the kind has no descriptor for the
/// environment's cgroup version.
pub fn new_mergeable_cgroup_updater_if_value_larger(
    env: &UpdaterEnv,
    kind: &ResourceType,
    parent_dir: &str,
    value: &str,
) -> Result<ResourceUpdater, UpdaterError> {
    new_mergeable_cgroup_updater_with_condition(
        env,
        kind,
        parent_dir,
        value,
        Arc::new(IfValueLarger),
    )
}

/// Create a cgroup updater that only widens cpusets on merge
///
/// # Errors
/// Returns [`UpdaterError::NotFound`] if the kind has no descriptor for the
/// environment's cgroup version.
pub fn new_mergeable_cgroup_updater_if_cpuset_looser(
    env: &UpdaterEnv,
    kind: &ResourceType,
    parent_dir: &str,
    value: &str,
) -> Result<ResourceUpdater, UpdaterError> {
    new_mergeable_cgroup_updater_with_condition(
        env,
        kind,
        parent_dir,
        value,
        Arc::new(IfCpuSetLooser),
    )
}

/// Create a cgroup updater routed through the environment's sandbox transport
///
/// # Errors
/// Returns [`UpdaterError::SandboxUnavailable`] if no transport is
/// configured, or [`UpdaterError::NotFound`] for unknown kinds.
pub fn new_sandboxed_cgroup_updater(
    env: &UpdaterEnv,
    kind: &ResourceType,
    parent_dir: &str,
    value: &str,
    sandbox_id: &str,
) -> Result<ResourceUpdater, UpdaterError> {
    let transport = env
        .sandbox()
        .cloned()
        .ok_or_else(|| UpdaterError::SandboxUnavailable {
            sandbox_id: sandbox_id.to_string(),
        })?;
    let updater = CgroupUpdater::new(env, kind, parent_dir, value, None)?;
    Ok(ResourceUpdater::Sandboxed(updater.sandboxed(sandbox_id, transport)))
}

/// Create an updater for the plain file `dir/file`
///
/// The resource type is the file name; no descriptor lookup happens.
#[must_use]
pub fn new_common_default_updater(
    env: &UpdaterEnv,
    file: &str,
    dir: impl Into<PathBuf>,
    value: &str,
) -> ResourceUpdater {
    let dir = dir.into();
    ResourceUpdater::Default(DefaultUpdater {
        resource_type: ResourceType::new(file),
        path: dir.join(file),
        dir,
        file: file.to_string(),
        value: value.to_string(),
        last_update: None,
        access: env.host_access().clone(),
        auditor: env.auditor().clone(),
    })
}
