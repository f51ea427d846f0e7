//! Run identity.
//!
//! A run id tags the log stream and the end-of-run summary so that
//! overlapping re-runs over the same archive are distinguishable. Artifact
//! names never embed it: artifacts are keyed by window bounds alone so that
//! re-entry finds prior output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for one pipeline invocation.
///
/// Format: `run-<date>-<time>-<random>`
/// Example: `run-20240101-143022-ab12cd`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run id from the current wall clock.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let random: String = uuid::Uuid::new_v4().to_string().chars().take(6).collect();
        RunId(format!("run-{}-{}", now.format("%Y%m%d-%H%M%S"), random))
    }

    /// Parse an existing run id string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with("run-") && s.len() > 12 {
            Some(RunId(s.to_string()))
        } else {
            None
        }
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = RunId::new();
        let parsed = RunId::parse(&id.0).expect("generated id must parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RunId::parse("").is_none());
        assert!(RunId::parse("sess-20240101").is_none());
    }
}
