//! Overlay resolver collaborator interface.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::node::Node;

/// Implicit overlay set, taken from the node's own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayContext {
    System,
    Runtime,
}

impl OverlayContext {
    pub fn as_str(self) -> &'static str {
        match self {
            OverlayContext::System => "system",
            OverlayContext::Runtime => "runtime",
        }
    }
}

impl fmt::Display for OverlayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which overlays to compose into the served archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlaySelection<'a> {
    Context(OverlayContext),
    /// Exactly these overlays, as requested by the node.
    Named(&'a [String]),
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("overlay does not exist: {0}")]
    DoesNotExist(String),

    #[error("overlay build failed: {0}")]
    Build(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a node's overlay selection to an archive path.
///
/// May build synchronously when `autobuild` is set; implementations must be
/// safe under concurrent identical requests.
pub trait OverlayResolver: Send + Sync {
    fn resolve(
        &self,
        node: &Node,
        selection: OverlaySelection<'_>,
        autobuild: bool,
    ) -> Result<PathBuf, OverlayError>;
}
