//! Optimistic concurrency expectations for versioned stock partitions.

use crate::error::{DomainError, DomainResult};

/// Version a writer expects a stored partition to be at when it commits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The partition must not exist yet (version 0).
    NoPartition,
    /// Require the partition to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation matching a version read earlier (0 means "absent").
    pub fn from_read(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::NoPartition
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoPartition => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::contention(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
