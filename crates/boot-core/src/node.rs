//! Node records as held by the registry.
//!
//! The provisioning core only ever sees a read-only snapshot of a node,
//! taken once per request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Boot-loader script template used when a node names none.
pub const DEFAULT_IPXE_TEMPLATE: &str = "default";

/// A provisioned (or placeholder) node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: NodeId,
    pub cluster: String,
    /// Container image the node boots.
    pub container: String,
    /// Boot-loader script template name, without extension.
    pub ipxe: String,
    pub kernel: KernelSettings,
    pub netdevs: BTreeMap<String, NetDev>,
    pub tags: BTreeMap<String, String>,
    /// Shared secret the node must present. Empty disables the check.
    pub asset_key: String,
    pub system_overlay: Vec<String>,
    pub runtime_overlay: Vec<String>,
    /// Configured but waiting for the first unknown hardware address to claim it.
    pub discoverable: bool,
    /// Auto-admitted for an unseen hardware address; carries no configuration.
    pub placeholder: bool,
}

/// Kernel selection and command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    /// Kernel version to serve instead of the one inside the container.
    #[serde(rename = "override")]
    pub override_version: String,
    pub args: String,
}

/// A network interface of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetDev {
    pub device: String,
    pub hwaddr: String,
    pub ipaddr: String,
    pub netmask: String,
    pub gateway: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub onboot: bool,
    pub primary: bool,
}

impl Node {
    /// An unconfigured record admitted for `hwaddr`.
    pub fn placeholder(hwaddr: &str) -> Self {
        let mut netdevs = BTreeMap::new();
        netdevs.insert(
            "default".to_string(),
            NetDev {
                hwaddr: hwaddr.to_string(),
                primary: true,
                ..NetDev::default()
            },
        );
        Self {
            id: hwaddr.to_string(),
            netdevs,
            placeholder: true,
            ..Self::default()
        }
    }

    /// False for placeholder records.
    pub fn is_valid(&self) -> bool {
        !self.placeholder
    }

    pub fn ipxe_template(&self) -> &str {
        if self.ipxe.is_empty() {
            DEFAULT_IPXE_TEMPLATE
        } else {
            &self.ipxe
        }
    }

    pub fn kernel_override(&self) -> Option<&str> {
        non_empty(&self.kernel.override_version)
    }

    pub fn container(&self) -> Option<&str> {
        non_empty(&self.container)
    }

    /// Hardware addresses bound to any of the node's interfaces.
    pub fn hwaddrs(&self) -> impl Iterator<Item = &str> {
        self.netdevs
            .values()
            .map(|dev| dev.hwaddr.as_str())
            .filter(|addr| !addr.is_empty())
    }

    /// Bind `hwaddr` to the primary interface, creating one if needed.
    ///
    /// The primary interface is the one flagged `primary`, else the first by name.
    pub fn bind_hwaddr(&mut self, hwaddr: &str) {
        let name = self
            .netdevs
            .iter()
            .find(|(_, dev)| dev.primary)
            .or_else(|| self.netdevs.iter().next())
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "default".to_string());
        let dev = self.netdevs.entry(name).or_default();
        dev.hwaddr = hwaddr.to_string();
        dev.primary = true;
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}
