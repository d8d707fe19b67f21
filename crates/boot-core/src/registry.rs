//! Node registry collaborator interface.

use thiserror::Error;

use crate::node::Node;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Placeholder capacity is exhausted; the address cannot be admitted.
    #[error("no unconfigured node slot available for {0}")]
    NoUnconfiguredSlot(String),

    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Lookup of nodes by hardware address.
pub trait NodeRegistry: Send + Sync {
    /// Return the node bound to `hwaddr`, admitting it if unseen.
    ///
    /// Admission must be atomic: concurrent first-contact calls for the same
    /// address observe one record, or receive
    /// [`RegistryError::NoUnconfiguredSlot`] when capacity runs out.
    fn get_or_admit(&self, hwaddr: &str) -> Result<Node, RegistryError>;
}
