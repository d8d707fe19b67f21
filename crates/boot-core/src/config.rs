//! bootd.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the daemon configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bootgrid/bootd.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub discovery: DiscoveryConfig,
    pub overlays: OverlayConfig,
    /// Node definitions imported into the registry at startup.
    pub nodes_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address advertised to boot templates.
    pub ipaddr: String,
    pub port: u16,
    /// Require a privileged source port for runtime and overlay requests.
    pub secure: bool,
    pub autobuild_overlays: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub sysconfdir: PathBuf,
    pub provision_dir: PathBuf,
    pub chroot_dir: PathBuf,
    pub overlay_dir: PathBuf,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum number of placeholder nodes. Zero disables admission.
    pub max_unconfigured: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Autobuild hook argv. Node id, image path and overlay names are appended.
    pub build_command: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ipaddr: "127.0.0.1".to_string(),
            port: 9873,
            secure: true,
            autobuild_overlays: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sysconfdir: PathBuf::from("/etc"),
            provision_dir: PathBuf::from("/var/lib/bootgrid/provision"),
            chroot_dir: PathBuf::from("/var/lib/bootgrid/chroots"),
            overlay_dir: PathBuf::from("/var/lib/bootgrid/overlays"),
            data_dir: PathBuf::from("/var/lib/bootgrid"),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_unconfigured: 256,
        }
    }
}

impl BootConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BootConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn template_dir(&self) -> PathBuf {
        self.paths.sysconfdir.join("bootgrid")
    }

    /// Boot-loader script template for the named node template.
    pub fn ipxe_template(&self, name: &str) -> PathBuf {
        self.template_dir().join("ipxe").join(format!("{name}.ipxe"))
    }

    /// Page served to nodes the registry has no configuration for.
    pub fn unconfigured_template(&self) -> PathBuf {
        self.template_dir().join("ipxe").join("unconfigured.ipxe")
    }

    pub fn grub_config_template(&self) -> PathBuf {
        self.template_dir().join("grub").join("grub.cfg.ww")
    }

    pub fn db_path(&self) -> PathBuf {
        self.paths.data_dir.join("bootgrid.redb")
    }
}
