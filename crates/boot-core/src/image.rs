//! Image store collaborator interface: where kernels, container images, and
//! EFI binaries live.

use std::path::PathBuf;

use thiserror::Error;

/// A kernel discovered inside a container root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo {
    pub path: PathBuf,
    pub version: String,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no kernel found in {0}")]
    NoKernel(PathBuf),

    #[error("no initramfs for kernel {version} in {root}")]
    NoInitramfs { root: PathBuf, version: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Path conventions and discovery inside container root filesystems.
pub trait ImageLayout: Send + Sync {
    /// Kernel image for an override kernel version.
    fn kernel_image(&self, kernel_override: &str) -> PathBuf;

    /// Kernel-module archive for an override kernel version.
    fn kmods_image(&self, kernel_override: &str) -> PathBuf;

    /// Container image archive.
    fn container_image(&self, container: &str) -> PathBuf;

    fn find_kernel(&self, container: &str) -> Result<KernelInfo, ImageError>;

    /// `None` when the container ships no shim.
    fn find_shim(&self, container: &str) -> Option<PathBuf>;

    /// `None` when the container ships no grub binary.
    fn find_grub(&self, container: &str) -> Option<PathBuf>;

    /// Boot-time init filesystem for `kernel_version`.
    fn initramfs(&self, container: &str, kernel_version: &str) -> Result<PathBuf, ImageError>;
}
