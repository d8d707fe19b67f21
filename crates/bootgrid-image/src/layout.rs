//! Filesystem image layout and discovery inside container root filesystems.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use boot_core::{ImageError, ImageLayout, KernelInfo};
use tracing::debug;
use walkdir::WalkDir;

/// Known shim locations, relative to a container rootfs.
const SHIM_PATHS: &[&str] = &[
    "usr/share/efi/x86_64/shim.efi",
    "usr/share/efi/aarch64/shim.efi",
    "usr/lib64/efi/shim.efi",
    "usr/lib/shim/shimx64.efi.signed",
    "usr/lib/shim/shimx64.efi",
];
const SHIM_NAMES: &[&str] = &["shimx64.efi", "shimaa64.efi", "shim.efi"];

/// Known grub locations, relative to a container rootfs.
const GRUB_PATHS: &[&str] = &[
    "usr/share/efi/x86_64/grub.efi",
    "usr/share/efi/aarch64/grub.efi",
    "usr/lib64/efi/grub.efi",
    "usr/lib/grub/x86_64-efi-signed/grubx64.efi.signed",
    "usr/lib/grub/x86_64-efi/monolithic/grubx64.efi",
];
const GRUB_NAMES: &[&str] = &["grubx64.efi", "grubaa64.efi", "grub.efi"];

/// Vendor directories under the EFI system partition, e.g. `EFI/rocky/`.
const ESP_DIR: &str = "boot/efi/EFI";

/// Image layout rooted at a provision directory and a chroot directory.
#[derive(Debug, Clone)]
pub struct FsImageLayout {
    provision_dir: PathBuf,
    chroot_dir: PathBuf,
}

impl FsImageLayout {
    pub fn new(provision_dir: impl Into<PathBuf>, chroot_dir: impl Into<PathBuf>) -> Self {
        Self {
            provision_dir: provision_dir.into(),
            chroot_dir: chroot_dir.into(),
        }
    }

    /// Root filesystem of a container.
    pub fn rootfs(&self, container: &str) -> PathBuf {
        self.chroot_dir.join(container).join("rootfs")
    }

    fn find_efi_binary(&self, container: &str, fixed: &[&str], names: &[&str]) -> Option<PathBuf> {
        let root = self.rootfs(container);
        fixed
            .iter()
            .map(|rel| root.join(rel))
            .find(|path| path.is_file())
            .or_else(|| {
                WalkDir::new(root.join(ESP_DIR))
                    .min_depth(2)
                    .max_depth(2)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(Result::ok)
                    .find(|entry| {
                        entry.file_type().is_file()
                            && names.iter().any(|name| entry.file_name() == *name)
                    })
                    .map(|entry| entry.into_path())
            })
    }
}

impl ImageLayout for FsImageLayout {
    fn kernel_image(&self, kernel_override: &str) -> PathBuf {
        self.provision_dir
            .join("kernel")
            .join(kernel_override)
            .join("vmlinuz")
    }

    fn kmods_image(&self, kernel_override: &str) -> PathBuf {
        self.provision_dir
            .join("kernel")
            .join(kernel_override)
            .join("kmods.img")
    }

    fn container_image(&self, container: &str) -> PathBuf {
        self.provision_dir
            .join("container")
            .join(format!("{container}.img"))
    }

    /// Highest-versioned kernel under `boot/` or `lib/modules/`.
    fn find_kernel(&self, container: &str) -> Result<KernelInfo, ImageError> {
        let root = self.rootfs(container);
        let mut found = boot_kernels(&root.join("boot"));
        found.extend(module_kernels(&root.join("lib").join("modules")));

        found.sort_by(|a, b| {
            compare_versions(&a.version, &b.version).then_with(|| a.path.cmp(&b.path))
        });
        let kernel = found.pop().ok_or(ImageError::NoKernel(root))?;
        debug!(%container, version = %kernel.version, path = ?kernel.path, "kernel discovered");
        Ok(kernel)
    }

    fn find_shim(&self, container: &str) -> Option<PathBuf> {
        self.find_efi_binary(container, SHIM_PATHS, SHIM_NAMES)
    }

    fn find_grub(&self, container: &str) -> Option<PathBuf> {
        self.find_efi_binary(container, GRUB_PATHS, GRUB_NAMES)
    }

    fn initramfs(&self, container: &str, kernel_version: &str) -> Result<PathBuf, ImageError> {
        let boot = self.rootfs(container).join("boot");
        [
            format!("initramfs-{kernel_version}.img"),
            format!("initrd-{kernel_version}"),
            format!("initrd.img-{kernel_version}"),
        ]
        .iter()
        .map(|name| boot.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ImageError::NoInitramfs {
            root: self.rootfs(container),
            version: kernel_version.to_string(),
        })
    }
}

/// `boot/vmlinuz-<version>[.gz]`, skipping rescue kernels.
fn boot_kernels(boot: &Path) -> Vec<KernelInfo> {
    let Ok(entries) = fs::read_dir(boot) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let version = name.strip_prefix("vmlinuz-")?;
            let version = version.strip_suffix(".gz").unwrap_or(version);
            if version.is_empty() || version.contains("rescue") {
                return None;
            }
            Some(KernelInfo {
                path: entry.path(),
                version: version.to_string(),
            })
        })
        .collect()
}

/// `lib/modules/<version>/vmlinuz[.gz]`.
fn module_kernels(modules: &Path) -> Vec<KernelInfo> {
    let Ok(entries) = fs::read_dir(modules) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let dir = entry.path();
            let path = ["vmlinuz", "vmlinuz.gz"]
                .iter()
                .map(|name| dir.join(name))
                .find(|path| path.is_file())?;
            Some(KernelInfo {
                path,
                version: entry.file_name().to_string_lossy().into_owned(),
            })
        })
        .collect()
}

/// Compare version strings, treating digit runs numerically.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (version_chunks(a), version_chunks(b));
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(m), Ok(n)) => m.cmp(&n),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn version_chunks(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    for i in 1..bytes.len() {
        if bytes[i].is_ascii_digit() != bytes[i - 1].is_ascii_digit() {
            chunks.push(&s[start..i]);
            start = i;
        }
    }
    if !s.is_empty() {
        chunks.push(&s[start..]);
    }
    chunks
}
