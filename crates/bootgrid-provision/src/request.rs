//! Request parsing: raw transport parameters into a [`BootRequest`].

use std::net::{IpAddr, SocketAddr};

use boot_core::{normalize_hwaddr, Compression, EfiFile, StageToken};
use serde::Deserialize;

use crate::error::ClientProtocolError;

/// Parameters as they arrive from the transport, all optional.
///
/// Field names match the query-string keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRequest {
    pub hwaddr: Option<String>,
    pub stage: Option<String>,
    /// Comma-separated overlay names.
    pub overlay: Option<String>,
    pub assetkey: Option<String>,
    pub compress: Option<String>,
    pub efifile: Option<String>,
}

/// A validated provisioning request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    /// Normalised hardware address, lower-case and colon-separated.
    pub hwaddr: String,
    pub stage: StageToken,
    pub overlays: Vec<String>,
    pub asset_key: Option<String>,
    pub compression: Compression,
    pub efi_file: Option<EfiFile>,
    pub remote: SocketAddr,
}

impl BootRequest {
    pub fn parse(raw: &RawRequest, remote: SocketAddr) -> Result<Self, ClientProtocolError> {
        let stage = present(&raw.stage).ok_or(ClientProtocolError::MissingStage)?;
        let hwaddr = present(&raw.hwaddr).ok_or(ClientProtocolError::MissingHwaddr)?;
        let hwaddr = normalize_hwaddr(hwaddr)?;

        let overlays = match present(&raw.overlay) {
            Some(list) => parse_overlays(list)?,
            None => Vec::new(),
        };

        Ok(Self {
            hwaddr,
            stage: StageToken::parse(stage),
            overlays,
            asset_key: present(&raw.assetkey).map(str::to_string),
            compression: Compression::parse(raw.compress.as_deref()),
            efi_file: present(&raw.efifile).map(EfiFile::parse),
            remote,
        })
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote.ip().to_canonical()
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_overlays(list: &str) -> Result<Vec<String>, ClientProtocolError> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            if is_valid_overlay_name(name) {
                Ok(name.to_string())
            } else {
                Err(ClientProtocolError::OverlayName(name.to_string()))
            }
        })
        .collect()
}

/// Overlay names become path components, so only a conservative charset is
/// accepted and the dot entries are refused.
fn is_valid_overlay_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
