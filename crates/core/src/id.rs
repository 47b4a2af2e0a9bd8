//! Unique identifiers for jobs and work items.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Prefix of generated job identifiers.
pub const JOB_ID_PREFIX: &str = "job_";

/// Prefix of generated work item identifiers.
pub const WORK_ID_PREFIX: &str = "work_";

/// Errors raised while building identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// An identifier cannot be empty
    #[error("identifier cannot be empty")]
    EmptyId,
}

/// Unique identifier for a Job.
///
/// Generated ids look like `job_01J...`; callers may also supply their own
/// opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generate a new JobId
    pub fn new() -> Self {
        Self(format!("{}{}", JOB_ID_PREFIX, Ulid::new()))
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CoreError::EmptyId);
        }
        Ok(Self(s.to_string()))
    }
}

/// Unique identifier for a WorkItem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkId(String);

impl WorkId {
    /// Generate a new WorkId
    pub fn new() -> Self {
        Self(format!("{}{}", WORK_ID_PREFIX, Ulid::new()))
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WorkId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CoreError::EmptyId);
        }
        Ok(Self(s.to_string()))
    }
}

/// Key of a work item inside the tracking structures.
pub type WorkKey = (JobId, WorkId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert!(a.as_str().starts_with(JOB_ID_PREFIX));
        assert_ne!(a, b);

        let w = WorkId::new();
        assert!(w.to_string().starts_with(WORK_ID_PREFIX));
    }

    #[test]
    fn custom_ids_parse() {
        let id: JobId = "nightly-sweep".parse().unwrap();
        assert_eq!(id.as_str(), "nightly-sweep");
        assert_eq!("".parse::<WorkId>(), Err(CoreError::EmptyId));
    }
}
