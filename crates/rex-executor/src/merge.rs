//! Merge conditions
//!
//! A [`MergeCondition`] decides, given the value currently stored in a
//! cgroup file and a requested value, what the file should hold and whether
//! a write is needed. Conditions keep hierarchical resources monotone: an
//! ancestor updated top-down is only ever widened, never narrowed.

use crate::error::{MergeConditionError, ValueSide};
use rex_cpuset::CpuSet;
use std::fmt::Debug;

/// Outcome of a merge condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeDecision {
    /// Value the file should hold; the old value when no write is needed
    pub value: String,

    /// Whether the file must be written
    pub need_write: bool,
}

impl MergeDecision {
    /// Decision to write `value`
    #[inline]
    #[must_use]
    pub fn write(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            need_write: true,
        }
    }

    /// Decision to keep the stored `old` value
    #[inline]
    #[must_use]
    pub fn keep(old: impl Into<String>) -> Self {
        Self {
            value: old.into(),
            need_write: false,
        }
    }
}

/// Policy combining a stored value with a requested one
///
/// Implementations must be stateless and deterministic.
pub trait MergeCondition: Send + Sync + Debug {
    /// Evaluate `(old, new)`
    ///
    /// # Errors
    /// Returns [`MergeConditionError`] naming the side that failed to parse.
    fn evaluate(&self, old: &str, new: &str) -> Result<MergeDecision, MergeConditionError>;

    /// Condition name (for logging)
    fn name(&self) -> &'static str;
}

/// Write only when the new integer is strictly larger than the stored one
#[derive(Debug, Clone, Copy, Default)]
pub struct IfValueLarger;

impl MergeCondition for IfValueLarger {
    fn evaluate(&self, old: &str, new: &str) -> Result<MergeDecision, MergeConditionError> {
        let v: i64 = new
            .parse()
            .map_err(|e| MergeConditionError::new(ValueSide::New, new, "int64", e))?;
        let o: i64 = old
            .parse()
            .map_err(|e| MergeConditionError::new(ValueSide::Old, old, "int64", e))?;

        if v > o {
            Ok(MergeDecision::write(new))
        } else {
            Ok(MergeDecision::keep(old))
        }
    }

    fn name(&self) -> &'static str {
        "if_value_larger"
    }
}

/// Write the union of both cpusets unless the new one is already covered
#[derive(Debug, Clone, Copy, Default)]
pub struct IfCpuSetLooser;

impl MergeCondition for IfCpuSetLooser {
    fn evaluate(&self, old: &str, new: &str) -> Result<MergeDecision, MergeConditionError> {
        let v = CpuSet::parse(new)
            .map_err(|e| MergeConditionError::new(ValueSide::New, new, "a valid cpuset", e))?;
        let o = CpuSet::parse(old)
            .map_err(|e| MergeConditionError::new(ValueSide::Old, old, "a valid cpuset", e))?;

        if v.is_subset_of(&o) {
            return Ok(MergeDecision::keep(old));
        }
        Ok(MergeDecision::write(v.union(&o).to_string()))
    }

    fn name(&self) -> &'static str {
        "if_cpuset_looser"
    }
}
