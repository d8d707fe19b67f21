//! Status telemetry: one event per terminal provisioning outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome label for a request that selected no artifact.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// Outcome label for a selected artifact that could not be delivered.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Outcome label for an asset-key mismatch.
pub const BAD_ASSET: &str = "BAD_ASSET";
/// Outcome label for template or resolver failures.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// A single status report for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub node_id: String,
    /// Stage display label, e.g. `KERNEL`.
    pub stage: String,
    /// Delivered artifact base name, or an outcome label.
    pub sent: String,
    pub ipaddr: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

#[derive(Debug, Error)]
#[error("status append failed: {0}")]
pub struct StatusError(pub String);

/// Append-only sink for status events.
pub trait StatusSink: Send + Sync {
    fn append(&self, event: &StatusEvent) -> Result<(), StatusError>;
}
