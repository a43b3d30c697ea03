//! Simulated protocol client.
//!
//! Offline stand-in for the real protocol library: fabricates pairing
//! codes, writes a plausible `creds.json`, and emits scripted
//! connection-state events. The binary uses it for local development;
//! the tests use it to drive every orchestrator path deterministically.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tokio::sync::{Mutex, broadcast};

use crate::error::WaError;
use crate::phone::PhoneNumber;
use crate::session::CREDS_FILE;

use super::{ConnectionEvent, WaClient, WaClientFactory};

/// Characters WhatsApp uses for pairing codes (no ambiguous 0/O, 1/I).
const CODE_CHARSET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
/// Raw pairing codes are eight characters before display formatting.
const CODE_LEN: usize = 8;

/// A document the simulated client "sent", kept for assertions.
#[derive(Debug, Clone)]
pub struct SentDocument {
    pub to: String,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub caption: String,
}

/// Scripted behavior for clients opened by [`SimulatedClientFactory`].
#[derive(Debug, Clone, Default)]
struct Script {
    /// Pretend the number is already a registered device.
    registered: bool,
    /// Emit `CredsUpdate` then `Open` after this delay.
    link_after: Option<Duration>,
    /// Emit `Close` after this delay.
    close_after: Option<Duration>,
    /// Fail `request_pairing_code`.
    fail_code_request: bool,
}

/// Offline [`WaClient`] with scripted events.
pub struct SimulatedClient {
    session_dir: PathBuf,
    script: Script,
    events_tx: broadcast::Sender<ConnectionEvent>,
    connected: AtomicBool,
    saves: AtomicUsize,
    sent: Mutex<Vec<SentDocument>>,
}

impl SimulatedClient {
    fn open_in(session_dir: &Path, script: Script) -> Result<Arc<Self>, WaError> {
        let creds = json!({
            "registered": script.registered,
            "me": serde_json::Value::Null,
            "platform": "simulated",
        });
        std::fs::write(session_dir.join(CREDS_FILE), creds.to_string()).map_err(|e| {
            WaError::OpenFailed {
                reason: e.to_string(),
            }
        })?;

        let (events_tx, _) = broadcast::channel(16);
        let client = Arc::new(Self {
            session_dir: session_dir.to_path_buf(),
            script,
            events_tx,
            connected: AtomicBool::new(true),
            saves: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });

        client.clone().spawn_script();
        Ok(client)
    }

    fn spawn_script(self: Arc<Self>) {
        if let Some(delay) = self.script.link_after {
            let client = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = client.events_tx.send(ConnectionEvent::CredsUpdate);
                let _ = client.events_tx.send(ConnectionEvent::Open);
            });
        }
        if let Some(delay) = self.script.close_after {
            let client = self;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                client.connected.store(false, Ordering::Relaxed);
                let _ = client.events_tx.send(ConnectionEvent::Close {
                    reason: "connection closed by peer".to_string(),
                });
            });
        }
    }

    /// Documents sent through this client, oldest first.
    pub async fn sent_documents(&self) -> Vec<SentDocument> {
        self.sent.lock().await.clone()
    }

    /// How many times `save_credentials` flushed the credential file.
    pub fn credential_saves(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Whether the client still considers itself connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WaClient for SimulatedClient {
    fn is_registered(&self) -> bool {
        self.script.registered
    }

    async fn request_pairing_code(&self, _number: &PhoneNumber) -> Result<String, WaError> {
        if self.script.fail_code_request {
            return Err(WaError::CodeRequestFailed {
                reason: "simulated refusal".to_string(),
            });
        }
        if !self.connected.load(Ordering::Relaxed) {
            return Err(WaError::NotConnected);
        }
        let mut rng = rand::thread_rng();
        let code: String = (0..CODE_LEN)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect();
        Ok(code)
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    async fn save_credentials(&self) -> Result<(), WaError> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        let creds = json!({
            "registered": self.script.registered,
            "me": serde_json::Value::Null,
            "platform": "simulated",
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        std::fs::write(self.session_dir.join(CREDS_FILE), creds.to_string()).map_err(|e| {
            WaError::PersistFailed {
                reason: e.to_string(),
            }
        })
    }

    async fn send_document(
        &self,
        to: &str,
        filename: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), WaError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(WaError::NotConnected);
        }
        self.sent.lock().await.push(SentDocument {
            to: to.to_string(),
            filename: filename.to_string(),
            bytes,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Factory producing [`SimulatedClient`]s, with knobs to script each path.
pub struct SimulatedClientFactory {
    script: Script,
    opened: Mutex<Vec<Arc<SimulatedClient>>>,
}

impl SimulatedClientFactory {
    /// Clients that never link on their own; codes are fabricated and the
    /// connection stays idle until the cache sweep reaps the attempt.
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Emit `CredsUpdate` + `Open` after `delay` on every opened client.
    pub fn link_after(mut self, delay: Duration) -> Self {
        self.script.link_after = Some(delay);
        self
    }

    /// Emit `Close` after `delay` on every opened client.
    pub fn close_after(mut self, delay: Duration) -> Self {
        self.script.close_after = Some(delay);
        self
    }

    /// Open clients whose credential state is already registered.
    pub fn already_registered(mut self) -> Self {
        self.script.registered = true;
        self
    }

    /// Make `request_pairing_code` fail on every opened client.
    pub fn failing_code_requests(mut self) -> Self {
        self.script.fail_code_request = true;
        self
    }

    /// Every client this factory has opened, oldest first.
    pub async fn opened_clients(&self) -> Vec<Arc<SimulatedClient>> {
        self.opened.lock().await.clone()
    }
}

impl Default for SimulatedClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaClientFactory for SimulatedClientFactory {
    async fn open(
        &self,
        number: &PhoneNumber,
        session_dir: &Path,
    ) -> Result<Arc<dyn WaClient>, WaError> {
        tracing::debug!(number = %number, dir = %session_dir.display(), "opening simulated session");
        let client = SimulatedClient::open_in(session_dir, self.script.clone())?;
        self.opened.lock().await.push(client.clone());
        Ok(client)
    }
}
