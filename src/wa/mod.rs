//! Protocol client seam.
//!
//! The WhatsApp protocol itself (handshake, crypto, framing, credential
//! persistence format) is an external library. The gateway talks to it
//! through these traits: open a session against a directory, ask for a
//! pairing code, watch connection-state events, send one document, hang up.
//!
//! [`sim`] provides an offline implementation for local development and
//! tests; real transports implement the same traits.

pub mod sim;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::WaError;
use crate::phone::PhoneNumber;

pub use sim::{SimulatedClient, SimulatedClientFactory};

/// Connection-state events emitted by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Incremental credential/key material changed and must be flushed
    /// before the flow proceeds.
    CredsUpdate,
    /// The link completed; the session is usable.
    Open,
    /// The connection ended, normally or otherwise.
    Close { reason: String },
}

/// One open protocol session.
#[async_trait]
pub trait WaClient: Send + Sync {
    /// Whether the loaded credential state already marks this number as a
    /// registered device.
    fn is_registered(&self) -> bool;

    /// Ask the remote service for a pairing code for `number`.
    ///
    /// Returns the raw, unformatted code.
    async fn request_pairing_code(&self, number: &PhoneNumber) -> Result<String, WaError>;

    /// Subscribe to connection-state events.
    ///
    /// Subscribe before triggering any state change; the channel does not
    /// replay missed events.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Flush pending credential updates to the session directory.
    async fn save_credentials(&self) -> Result<(), WaError>;

    /// Send a document message.
    async fn send_document(
        &self,
        to: &str,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), WaError>;

    /// Tear the connection down. Idempotent.
    async fn disconnect(&self);
}

/// Opens protocol sessions. Connect/query timeouts are the library's
/// responsibility and are fixed at open time.
#[async_trait]
pub trait WaClientFactory: Send + Sync {
    async fn open(
        &self,
        number: &PhoneNumber,
        session_dir: &Path,
    ) -> Result<Arc<dyn WaClient>, WaError>;
}
