//! bootgrid-api — HTTP surface for Bootgrid.
//!
//! Translates HTTP requests into provisioning requests and streams the
//! chosen artifact back.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/provision/{hwaddr}?stage=..` | Any stage, chosen by query |
//! | GET | `/efiboot/{file}` | EFI network boot; hwaddr from the ARP table |
//! | GET | `/status` | Latest status event per node |
//! | GET | `/{stage}/{hwaddr}` | Per-stage alias (`overlay-system`, `overlay-runtime`, ...) |
//!
//! All provisioning routes accept `overlay`, `assetkey` and `compress`
//! query parameters.

pub mod arp;
pub mod body;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use bootgrid_provision::Provisioner;
use bootgrid_state::StateStore;

pub use arp::{NeighborTable, ProcNetArp};

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub provisioner: Arc<Provisioner>,
    pub store: StateStore,
    pub neighbors: Arc<dyn NeighborTable>,
}

/// Build the complete router.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// handlers need the peer address for the secure-mode port check.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/provision/{hwaddr}", get(handlers::provision))
        .route("/efiboot/{file}", get(handlers::efiboot))
        .route("/status", get(handlers::status))
        .route("/{stage}/{hwaddr}", get(handlers::stage_alias))
        .with_state(state)
}
