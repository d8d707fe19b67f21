pub mod config;
pub mod hwaddr;
pub mod image;
pub mod node;
pub mod overlay;
pub mod registry;
pub mod stage;
pub mod status;

pub use config::BootConfig;
pub use hwaddr::{normalize_hwaddr, HwaddrError};
pub use image::{ImageError, ImageLayout, KernelInfo};
pub use node::{KernelSettings, NetDev, Node, NodeId};
pub use overlay::{OverlayContext, OverlayError, OverlayResolver, OverlaySelection};
pub use registry::{NodeRegistry, RegistryError};
pub use stage::{Compression, EfiFile, Stage, StageToken};
pub use status::{StatusError, StatusEvent, StatusSink};
