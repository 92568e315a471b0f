//! CPU set parsing and algebra
//!
//! Provides [`CpuSet`], parsed from and rendered to the kernel's cpulist
//! format (`0-3,6,8-9`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Upper bound on CPU indices, the kernel's largest `NR_CPUS`
pub const MAX_CPUS: usize = 8192;

/// Set of CPU indices
///
/// Rendering via [`Display`](fmt::Display) is canonical: indices ascend and
/// adjacent indices collapse into `a-b` ranges, so two equal sets always
/// produce the same string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuSet {
    cpus: BTreeSet<usize>,
}

impl CpuSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a cpulist expression
    ///
    /// An empty (or whitespace-only) string is the empty set, matching what
    /// the kernel reports for a cgroup without CPUs.
    ///
    /// # Errors
    /// Returns [`CpuSetError`] on malformed tokens, reversed ranges, or
    /// indices at or above [`MAX_CPUS`].
    pub fn parse(s: &str) -> Result<Self, CpuSetError> {
        let s = s.trim();
        let mut cpus = BTreeSet::new();
        if s.is_empty() {
            return Ok(Self { cpus });
        }

        for token in s.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(CpuSetError::EmptyToken {
                    input: s.to_string(),
                });
            }

            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_index(start, token)?;
                    let end = parse_index(end, token)?;
                    if start > end {
                        return Err(CpuSetError::ReversedRange {
                            token: token.to_string(),
                        });
                    }
                    cpus.extend(start..=end);
                }
                None => {
                    cpus.insert(parse_index(token, token)?);
                }
            }
        }

        Ok(Self { cpus })
    }

    /// Whether every CPU in `self` is also in `other`
    #[inline]
    #[must_use]
    pub fn is_subset_of(&self, other: &CpuSet) -> bool {
        self.cpus.is_subset(&other.cpus)
    }

    /// Union of both sets
    #[must_use]
    pub fn union(&self, other: &CpuSet) -> CpuSet {
        Self {
            cpus: self.cpus.union(&other.cpus).copied().collect(),
        }
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    /// Number of CPUs in the set
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Check if set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Iterate CPUs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }
}

fn parse_index(raw: &str, token: &str) -> Result<usize, CpuSetError> {
    let index = raw
        .trim()
        .parse::<usize>()
        .map_err(|_| CpuSetError::InvalidNumber {
            token: token.to_string(),
        })?;
    if index >= MAX_CPUS {
        return Err(CpuSetError::OutOfRange {
            token: token.to_string(),
        });
    }
    Ok(index)
}

impl FromStr for CpuSet {
    type Err = CpuSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut iter = self.cpus.iter().copied().peekable();

        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }

            if !first {
                f.write_str(",")?;
            }
            first = false;

            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }

        Ok(())
    }
}

impl TryFrom<String> for CpuSet {
    type Error = CpuSetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CpuSet> for String {
    fn from(set: CpuSet) -> Self {
        set.to_string()
    }
}

/// CPU set parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuSetError {
    /// Empty element between separators, e.g. `0,,2`
    #[error("empty element in cpuset {input:?}")]
    EmptyToken {
        /// Full input
        input: String,
    },

    /// Element is not a CPU index or range
    #[error("invalid cpuset element {token:?}")]
    InvalidNumber {
        /// Offending element
        token: String,
    },

    /// CPU index at or above [`MAX_CPUS`]
    #[error("cpuset element {token:?} exceeds the {} CPU limit", MAX_CPUS)]
    OutOfRange {
        /// Offending element
        token: String,
    },

    /// Range whose start exceeds its end, e.g. `5-2`
    #[error("reversed range {token:?} in cpuset")]
    ReversedRange {
        /// Offending element
        token: String,
    },
}
