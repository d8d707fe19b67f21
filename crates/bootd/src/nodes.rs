//! Node definitions file.
//!
//! ```toml
//! [nodes.n0001]
//! cluster = "east"
//! container = "rocky-9"
//! asset_key = "s3cret"
//! runtime_overlay = ["generic", "hosts"]
//!
//! [nodes.n0001.kernel]
//! args = "quiet crashkernel=no"
//!
//! [nodes.n0001.netdevs.eth0]
//! hwaddr = "AA-BB-CC-00-00-01"
//! ipaddr = "10.0.0.11"
//! netmask = "255.255.255.0"
//! primary = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use boot_core::{normalize_hwaddr, Node};
use bootgrid_state::StateStore;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct NodesFile {
    #[serde(default)]
    nodes: BTreeMap<String, Node>,
}

/// Parse node definitions. Ids come from the table keys and hardware
/// addresses are normalised.
pub fn parse(content: &str) -> anyhow::Result<Vec<Node>> {
    let file: NodesFile = toml::from_str(content)?;
    file.nodes
        .into_iter()
        .map(|(id, mut node)| -> anyhow::Result<Node> {
            for (name, dev) in node.netdevs.iter_mut().filter(|(_, d)| !d.hwaddr.is_empty()) {
                dev.hwaddr = normalize_hwaddr(&dev.hwaddr)
                    .with_context(|| format!("node {id}, netdev {name}"))?;
            }
            node.id = id;
            Ok(node)
        })
        .collect()
}

/// Load `path` into the store. Returns the number of nodes written.
///
/// Safe to repeat on every start: discoverable nodes already claimed by a
/// hardware address stay bound to it.
pub fn import(store: &StateStore, path: &Path) -> anyhow::Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading node definitions from {}", path.display()))?;
    let nodes = parse(&content)?;
    for node in &nodes {
        store.import_node(node)?;
    }
    Ok(nodes.len())
}
