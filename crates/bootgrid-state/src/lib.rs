//! bootgrid-state — embedded node registry and status log for Bootgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for node records, the hardware-address index, and the append-only
//! status log.
//!
//! # Architecture
//!
//! Node records are JSON-serialized into redb's `&[u8]` value columns and
//! keyed by node id. A second table maps each bound hardware address to its
//! node id. Admission of unseen addresses happens inside a single write
//! transaction; redb serialises writers, so concurrent first contact for the
//! same address always observes one record.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements both [`boot_core::NodeRegistry`] and
//! [`boot_core::StatusSink`].

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
