//! Overlay image resolution.
//!
//! Overlay images are built elsewhere; this resolver only maps a selection
//! to its image path. When autobuild is on and the image is missing, an
//! optional [`OverlayBuilder`] is asked to produce it in place.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use boot_core::{Node, OverlayContext, OverlayError, OverlayResolver, OverlaySelection};
use tracing::{debug, info};

/// Builds an overlay image from overlay sources.
///
/// Called synchronously from request handling. Implementations must tolerate
/// concurrent calls for the same image (build to a temp file and rename, or
/// serialise internally).
pub trait OverlayBuilder: Send + Sync {
    fn build(&self, node: &Node, overlays: &[String], image: &Path) -> Result<(), OverlayError>;
}

/// Runs an external program to build overlay images.
///
/// The program is called as `<program> [args...] <node id> <image path>
/// <overlay names...>` and must leave the image at the given path. Builds are
/// serialised; an image that appeared while waiting is not rebuilt.
#[derive(Debug)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    lock: Mutex<()>,
}

impl CommandBuilder {
    /// `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            lock: Mutex::new(()),
        })
    }
}

impl OverlayBuilder for CommandBuilder {
    fn build(&self, node: &Node, overlays: &[String], image: &Path) -> Result<(), OverlayError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| OverlayError::Build("overlay build lock poisoned".to_string()))?;
        if image.is_file() {
            return Ok(());
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&node.id).arg(image).args(overlays);
        debug!("Running: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| OverlayError::Build(format!("cannot run {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(OverlayError::Build(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !image.is_file() {
            return Err(OverlayError::Build(format!(
                "{} produced no image at {}",
                self.program,
                image.display()
            )));
        }
        Ok(())
    }
}

/// Resolves overlay selections to images under `<provision_dir>/overlays`.
#[derive(Clone)]
pub struct FsOverlayResolver {
    image_dir: PathBuf,
    source_dir: PathBuf,
    builder: Option<Arc<dyn OverlayBuilder>>,
}

impl FsOverlayResolver {
    pub fn new(provision_dir: &Path, overlay_dir: &Path) -> Self {
        Self {
            image_dir: provision_dir.join("overlays"),
            source_dir: overlay_dir.to_path_buf(),
            builder: None,
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn OverlayBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Image path for a node's overlay selection.
    pub fn image_path(&self, node_id: &str, selection: OverlaySelection<'_>) -> PathBuf {
        let stem = match selection {
            OverlaySelection::Context(OverlayContext::System) => "__SYSTEM__".to_string(),
            OverlaySelection::Context(OverlayContext::Runtime) => "__RUNTIME__".to_string(),
            OverlaySelection::Named(names) => names.join("-"),
        };
        self.image_dir.join(node_id).join(format!("{stem}.img"))
    }
}

impl OverlayResolver for FsOverlayResolver {
    fn resolve(
        &self,
        node: &Node,
        selection: OverlaySelection<'_>,
        autobuild: bool,
    ) -> Result<PathBuf, OverlayError> {
        let overlays = match selection {
            OverlaySelection::Context(OverlayContext::System) => node.system_overlay.clone(),
            OverlaySelection::Context(OverlayContext::Runtime) => node.runtime_overlay.clone(),
            OverlaySelection::Named(names) => {
                if let Some(missing) = names.iter().find(|n| !self.source_dir.join(n).is_dir()) {
                    return Err(OverlayError::DoesNotExist(missing.clone()));
                }
                names.to_vec()
            }
        };

        let image = self.image_path(&node.id, selection);
        if autobuild && !image.is_file() {
            match &self.builder {
                Some(builder) => {
                    info!(node = %node.id, ?overlays, image = ?image, "building overlay image");
                    builder.build(node, &overlays, &image)?;
                }
                None => debug!(node = %node.id, image = ?image, "overlay image missing, no builder configured"),
            }
        }
        Ok(image)
    }
}
