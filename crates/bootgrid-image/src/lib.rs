//! bootgrid-image — on-disk image store for Bootgrid.
//!
//! Implements the image collaborators the provisioning core consumes:
//!
//! - **`layout`** — [`FsImageLayout`]: override kernels, container image
//!   archives, and discovery of kernels, shim/grub binaries, and initramfs
//!   images inside container root filesystems.
//! - **`overlay`** — [`FsOverlayResolver`]: maps a node's overlay selection
//!   to a prebuilt overlay image, optionally asking an [`OverlayBuilder`]
//!   (such as the external-program [`CommandBuilder`]) to produce a missing
//!   one.
//!
//! # Layout
//!
//! ```text
//! <provision_dir>/
//!   kernel/<version>/vmlinuz
//!   kernel/<version>/kmods.img
//!   container/<name>.img
//!   overlays/<node>/__SYSTEM__.img
//!   overlays/<node>/__RUNTIME__.img
//!   overlays/<node>/<a>-<b>.img
//! <chroot_dir>/<name>/rootfs/
//! ```

pub mod layout;
pub mod overlay;

pub use layout::FsImageLayout;
pub use overlay::{CommandBuilder, FsOverlayResolver, OverlayBuilder};
