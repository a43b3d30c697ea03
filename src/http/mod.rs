//! HTTP surface.
//!
//! Thin layer over the orchestrator and the code cache: input
//! normalization and delegation only, no business logic of its own.

mod routes;
mod server;

pub use routes::{AppState, router};
pub use server::{PairingServer, PairingServerConfig};
