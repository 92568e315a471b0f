//! Audit trail for resource changes
//!
//! Every write of a kernel interface file is reported to an [`AuditSink`]
//! through an [`Auditor`]. Auditing is best-effort: sink errors are logged
//! and never fail the update that produced them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

/// Reason tag for cgroup writes
pub const REASON_UPDATE_CGROUPS: &str = "UpdateCgroups";

/// Reason tag for plain system file writes
pub const REASON_UPDATE_SYSTEM_CONFIG: &str = "UpdateSystemConfig";

/// Verbosity used for resource writes
pub const UPDATE_VERBOSITY: u8 = 5;

/// One audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Time recorded
    pub timestamp: DateTime<Utc>,
    /// Verbosity (higher is noisier)
    pub verbosity: u8,
    /// Reason tag
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

/// Audit sink error
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Sink refused the event
    #[error("audit event rejected: {0}")]
    Rejected(String),
}

/// Destination of audit events
pub trait AuditSink: Send + Sync + Debug {
    /// Record one event
    ///
    /// # Errors
    /// Returns [`AuditError`] if the event could not be stored.
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Sink emitting events as `tracing` records under target `rex::audit`
#[derive(Debug, Clone, Copy)]
pub struct TracingAuditSink {
    max_verbosity: u8,
}

impl TracingAuditSink {
    /// Create sink dropping events noisier than `max_verbosity`
    #[inline]
    #[must_use]
    pub fn new(max_verbosity: u8) -> Self {
        Self { max_verbosity }
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if event.verbosity <= self.max_verbosity {
            tracing::info!(target: "rex::audit", reason = %event.reason, "{}", event.message);
        }
        Ok(())
    }
}

/// Bounded in-memory sink keeping the most recent events
///
/// Events are also forwarded to `tracing` at debug level.
#[derive(Debug)]
pub struct MemoryAuditSink {
    capacity: usize,
    max_verbosity: u8,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create sink retaining up to `capacity` events
    #[must_use]
    pub fn new(capacity: usize, max_verbosity: u8) -> Self {
        Self {
            capacity,
            max_verbosity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Snapshot of retained events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of retained events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if no events are retained
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if event.verbosity > self.max_verbosity || self.capacity == 0 {
            return Ok(());
        }
        tracing::debug!(target: "rex::audit", reason = %event.reason, "{}", event.message);

        let mut guard = self.events.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
        Ok(())
    }
}

/// Entry point for emitting audit events
#[derive(Debug, Clone, Default)]
pub struct Auditor {
    sink: Option<Arc<dyn AuditSink>>,
}

impl Auditor {
    /// Create auditor writing to `sink`
    #[inline]
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Create auditor discarding every event
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Start an event at the given verbosity
    #[inline]
    #[must_use]
    pub fn v(&self, verbosity: u8) -> AuditRecord<'_> {
        AuditRecord {
            auditor: self,
            verbosity,
            reason: String::new(),
            message: String::new(),
        }
    }
}

/// Event under construction, see [`Auditor::v`]
#[derive(Debug)]
#[must_use = "audit records do nothing until `record` is called"]
pub struct AuditRecord<'a> {
    auditor: &'a Auditor,
    verbosity: u8,
    reason: String,
    message: String,
}

impl AuditRecord<'_> {
    /// Set reason tag
    #[inline]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set message
    #[inline]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Hand the event to the sink
    ///
    /// # Errors
    /// Returns the sink's [`AuditError`].
    pub fn record(self) -> Result<(), AuditError> {
        let Some(sink) = &self.auditor.sink else {
            return Ok(());
        };
        sink.record(AuditEvent {
            timestamp: Utc::now(),
            verbosity: self.verbosity,
            reason: self.reason,
            message: self.message,
        })
    }
}
