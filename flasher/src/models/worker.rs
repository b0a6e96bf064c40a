//! Worker identity

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one worker instance.
///
/// Passed explicitly to everything that publishes status or checks liveness
/// so several workers can share a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub id: Uuid,
    pub name: String,
    pub facility_code: String,
}

impl WorkerIdentity {
    /// Create an identity with a fresh id
    pub fn new(name: impl Into<String>, facility_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            facility_code: facility_code.into(),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.id)
    }
}
