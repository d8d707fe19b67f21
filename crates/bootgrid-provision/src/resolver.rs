//! Node identity: registry lookup with admission, then asset-key check.

use std::sync::Arc;

use boot_core::{Node, NodeRegistry};

use crate::error::ProvisionError;

pub struct NodeResolver {
    registry: Arc<dyn NodeRegistry>,
}

impl NodeResolver {
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Look up (or admit) the node for `hwaddr` and verify its asset key.
    ///
    /// A node with an empty asset key accepts any request. Otherwise the
    /// request must carry exactly that key, whatever the stage.
    pub fn resolve(&self, hwaddr: &str, asset_key: Option<&str>) -> Result<Node, ProvisionError> {
        let node = self.registry.get_or_admit(hwaddr)?;
        if !node.asset_key.is_empty() && asset_key != Some(node.asset_key.as_str()) {
            return Err(ProvisionError::AssetKey { node: node.id });
        }
        Ok(node)
    }
}
