//! Boot stage vocabulary and the tokens that travel with a request.
//!
//! The stage set is closed. Anything outside it is carried as
//! [`StageToken::Unrecognized`] so the router can answer it explicitly
//! instead of falling through a string comparison chain.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A phase of node boot or runtime refresh for which an artifact is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Boot-loader script (iPXE), text-templated.
    Ipxe,
    Kernel,
    /// Kernel-module archive for an override kernel.
    Kmods,
    /// Container image archive.
    Container,
    /// System overlay archive.
    System,
    /// Runtime overlay archive.
    Runtime,
    /// EFI network boot; the concrete file is named by [`EfiFile`].
    Efiboot,
    Shim,
    Grub,
    Initramfs,
}

/// Wire token and status label per stage, indexed by discriminant.
const STAGES: [(Stage, &str, &str); 10] = [
    (Stage::Ipxe, "ipxe", "IPXE"),
    (Stage::Kernel, "kernel", "KERNEL"),
    (Stage::Kmods, "kmods", "KMODS_OVERLAY"),
    (Stage::Container, "container", "CONTAINER"),
    (Stage::System, "system", "SYSTEM_OVERLAY"),
    (Stage::Runtime, "runtime", "RUNTIME_OVERLAY"),
    (Stage::Efiboot, "efiboot", "EFI"),
    (Stage::Shim, "shim", "SHIM"),
    (Stage::Grub, "grub", "GRUB"),
    (Stage::Initramfs, "initramfs", "INITRAMFS"),
];

impl Stage {
    /// Parse a wire token. Case-sensitive.
    pub fn from_token(token: &str) -> Option<Stage> {
        STAGES
            .iter()
            .find(|(_, t, _)| *t == token)
            .map(|(stage, _, _)| *stage)
    }

    pub fn token(self) -> &'static str {
        STAGES[self as usize].1
    }

    /// Display label recorded in status events.
    pub fn status_label(self) -> &'static str {
        STAGES[self as usize].2
    }

    /// Whether secure mode requires a privileged source port for this stage.
    pub fn is_security_sensitive(self) -> bool {
        matches!(self, Stage::Runtime)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// The stage named by a request, recognised or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageToken {
    Known(Stage),
    Unrecognized(String),
}

impl StageToken {
    pub fn parse(token: &str) -> Self {
        match Stage::from_token(token) {
            Some(stage) => StageToken::Known(stage),
            None => StageToken::Unrecognized(token.to_string()),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageToken::Known(stage) => Some(*stage),
            StageToken::Unrecognized(_) => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            StageToken::Known(stage) => stage.status_label(),
            StageToken::Unrecognized(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for StageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageToken::Known(stage) => stage.fmt(f),
            StageToken::Unrecognized(token) => f.write_str(token),
        }
    }
}

/// File requested by firmware during an EFI network boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EfiFile {
    /// `shim.efi`
    Shim,
    /// Any of the grub binary names.
    Grub(String),
    /// `grub.cfg`, rendered from the GRUB config template.
    GrubConfig,
    Unrecognized(String),
}

const GRUB_BINARIES: [&str; 6] = [
    "grub.efi",
    "grub-tpm.efi",
    "grubx64.efi",
    "grubia32.efi",
    "grubaa64.efi",
    "grubarm.efi",
];

impl EfiFile {
    pub fn parse(name: &str) -> Self {
        match name {
            "shim.efi" => EfiFile::Shim,
            "grub.cfg" => EfiFile::GrubConfig,
            n if GRUB_BINARIES.contains(&n) => EfiFile::Grub(n.to_string()),
            other => EfiFile::Unrecognized(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EfiFile::Shim => "shim.efi",
            EfiFile::GrubConfig => "grub.cfg",
            EfiFile::Grub(name) | EfiFile::Unrecognized(name) => name,
        }
    }
}

/// Requested delivery encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Serve the pre-compressed `<file>.gz` sibling.
    Gzip,
    Unsupported(String),
}

impl Compression {
    /// An absent or empty token means no compression.
    pub fn parse(token: Option<&str>) -> Self {
        match token {
            None | Some("") => Compression::None,
            Some("gz") => Compression::Gzip,
            Some(other) => Compression::Unsupported(other.to_string()),
        }
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self, Compression::None)
    }

    pub fn token(&self) -> &str {
        match self {
            Compression::None => "",
            Compression::Gzip => "gz",
            Compression::Unsupported(token) => token,
        }
    }
}
