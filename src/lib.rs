//! pairgate — WhatsApp pairing-code gateway.
//!
//! Accepts a phone number over HTTP, opens a protocol session against a
//! fresh credential directory, requests a pairing code from the remote
//! service and caches it for five minutes of polling. Once the user links
//! the device, the generated `creds.json` is sent back to their own chat
//! and all local state is purged.
//!
//! The protocol itself lives in an external library behind the traits in
//! [`wa`]; this crate owns the cache, the per-number orchestration, the
//! session directories, and the HTTP surface.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod pairing;
pub mod phone;
pub mod session;
pub mod wa;

pub use cache::{PairingCodeCache, PairingEntry};
pub use config::Config;
pub use error::{Error, Result};
pub use pairing::{PairingOrchestrator, PairingOutcome};
pub use phone::PhoneNumber;
pub use session::SessionStore;
