//! Template bindings for text-templated stages.

use std::collections::BTreeMap;

use boot_core::config::ServerConfig;
use boot_core::{NetDev, Node};
use serde::Serialize;

use crate::request::BootRequest;

/// Variables visible to boot-loader scripts, the GRUB config and the
/// unconfigured page. Unset fields render as empty values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplateContext {
    pub message: String,
    pub wait_time: String,
    pub hostname: String,
    pub fqdn: String,
    pub id: String,
    pub cluster: String,
    pub container: String,
    pub hwaddr: String,
    pub ipaddr: String,
    pub port: String,
    pub kernel_args: String,
    pub kernel_override: String,
    pub tags: BTreeMap<String, String>,
    pub netdevs: BTreeMap<String, NetDev>,
}

impl TemplateContext {
    /// Context for a node the registry holds no configuration for.
    pub fn unconfigured(hwaddr: &str) -> Self {
        Self {
            hwaddr: hwaddr.to_string(),
            ..Self::default()
        }
    }

    pub fn for_node(node: &Node, request: &BootRequest, server: &ServerConfig) -> Self {
        Self {
            message: String::new(),
            wait_time: String::new(),
            hostname: node.id.clone(),
            fqdn: node.id.clone(),
            id: node.id.clone(),
            cluster: node.cluster.clone(),
            container: node.container.clone(),
            hwaddr: request.hwaddr.clone(),
            ipaddr: server.ipaddr.clone(),
            port: server.port.to_string(),
            kernel_args: node.kernel.args.clone(),
            kernel_override: node.kernel.override_version.clone(),
            tags: node.tags.clone(),
            netdevs: node.netdevs.clone(),
        }
    }
}
