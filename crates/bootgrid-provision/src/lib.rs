//! bootgrid-provision — the stage-dispatch engine behind network boot.
//!
//! Maps a node's claimed identity, the boot stage it asks for and a few
//! auxiliary parameters to exactly one artifact: a boot-loader script,
//! kernel, module archive, container image, overlay archive, EFI binary or
//! init filesystem.
//!
//! # Pipeline
//!
//! | Step | Module | Failure |
//! |---|---|---|
//! | Parse | [`request`] | 400, no status |
//! | Secure-mode port check | [`gate`] | 401, no status |
//! | Lookup or admit node, asset key | [`resolver`] | 503 no status / 401 `BAD_ASSET` |
//! | Stage dispatch | [`router`] | empty resource → 400 `BAD_REQUEST` |
//! | Render or pick file | [`delivery`], [`render`] | 404 `NOT_FOUND` / 500 `INTERNAL_ERROR` |
//! | Status event | [`report`] | logged only |
//!
//! Registry, image store, overlay resolver and status sink are injected
//! through [`Collaborators`], so the whole pipeline runs against fakes in
//! tests.

pub mod context;
pub mod delivery;
pub mod error;
mod functions;
pub mod gate;
pub mod observe;
pub mod provisioner;
pub mod render;
pub mod report;
pub mod request;
pub mod resolver;
pub mod router;

pub use context::TemplateContext;
pub use delivery::{Delivery, Payload};
pub use error::{ClientProtocolError, ProvisionError};
pub use observe::{Decision, Fallback, Observer, TracingObserver};
pub use provisioner::{Collaborators, Provisioner};
pub use render::{TemplateError, TemplateRenderer};
pub use report::{Receipt, Reporter};
pub use request::{BootRequest, RawRequest};
pub use router::{StageResource, StageRouter};
