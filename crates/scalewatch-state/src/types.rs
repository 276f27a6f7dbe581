//! Records persisted by the state store.

use serde::{Deserialize, Serialize};

/// Desired replica count held for a service by the local scaling target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredCountRecord {
    pub service_id: String,
    pub desired_count: u32,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

/// A stored secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub value: String,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}
