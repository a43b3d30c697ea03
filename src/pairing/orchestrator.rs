//! The per-number pairing state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cache::PairingCodeCache;
use crate::config::Config;
use crate::error::{PairingError, Result};
use crate::phone::PhoneNumber;
use crate::session::{CREDS_FILE, SessionStore};
use crate::wa::{ConnectionEvent, WaClient, WaClientFactory};

/// Caption attached to the delivered credential file.
pub const CREDS_CAPTION: &str =
    "Your WhatsApp session file. Keep it private: anyone holding this file can use your account.";

/// States of one pairing attempt. Terminal on every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Start,
    AwaitingRegistration,
    CodeRequested,
    WaitingForLink,
    Done,
    Failed,
}

/// How a successfully initiated attempt answered the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// A fresh pairing code, display-formatted.
    Code(String),
    /// The number is already a registered device; no code was issued.
    AlreadyRegistered,
}

/// Format a raw pairing code into hyphen-joined groups of four.
pub fn format_code(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Drives pairing attempts: one state machine per phone number.
///
/// Attempts for different numbers are independent; a second attempt for the
/// same number replaces the first (its cache entry and session directory are
/// wiped, and its still-running watcher is invalidated via a generation
/// counter so late events become no-ops).
pub struct PairingOrchestrator {
    cache: Arc<PairingCodeCache>,
    store: SessionStore,
    factory: Arc<dyn WaClientFactory>,
    stabilize_delay: Duration,
    post_open_delay: Duration,
    code_ttl: Duration,
    generations: Arc<RwLock<HashMap<String, u64>>>,
}

impl PairingOrchestrator {
    pub fn new(
        cache: Arc<PairingCodeCache>,
        store: SessionStore,
        factory: Arc<dyn WaClientFactory>,
        config: &Config,
    ) -> Self {
        Self {
            cache,
            store,
            factory,
            stabilize_delay: config.stabilize_delay,
            post_open_delay: config.post_open_delay,
            code_ttl: config.code_ttl,
            generations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The code cache this orchestrator writes into.
    pub fn cache(&self) -> &Arc<PairingCodeCache> {
        &self.cache
    }

    /// Start a pairing attempt for raw user input.
    ///
    /// Validates and normalizes the number (no side effects on rejection),
    /// wipes any state left by a previous attempt, opens a protocol session
    /// against a fresh directory and walks the state machine up to
    /// `WaitingForLink`. Returns the formatted code (also cached for the
    /// polling endpoints) or the already-registered sentinel; the link
    /// watcher continues in the background.
    pub async fn begin(&self, raw: &str) -> Result<PairingOutcome> {
        let number = PhoneNumber::normalize(raw)?;
        let generation = self.bump_generation(&number).await;

        let mut state = PairingState::Start;
        tracing::info!(number = %number, generation, state = ?state, "starting pairing attempt");

        // Last writer wins: evict the previous code and start from an
        // empty directory.
        self.cache.remove(&number).await;
        self.store.prepare(&number)?;

        let client = match self.factory.open(&number, &self.store.dir_for(&number)).await {
            Ok(client) => client,
            Err(e) => {
                let _ = self.store.remove(&number);
                Self::clear_generation(&self.generations, &number, generation).await;
                tracing::warn!(number = %number, error = %e, "failed to open protocol session");
                return Err(PairingError::Wa(e).into());
            }
        };
        let mut events = client.subscribe();

        state = PairingState::AwaitingRegistration;
        tracing::debug!(number = %number, state = ?state, "session opened");

        if client.is_registered() {
            client.disconnect().await;
            self.store.remove(&number)?;
            Self::clear_generation(&self.generations, &number, generation).await;
            tracing::info!(number = %number, "number already registered, no code issued");
            return Ok(PairingOutcome::AlreadyRegistered);
        }

        // Let the connection settle before asking for a code. A close in
        // this window fails the attempt: no code was ever produced.
        let settle = tokio::time::sleep(self.stabilize_delay);
        tokio::pin!(settle);
        loop {
            tokio::select! {
                _ = &mut settle => break,
                event = events.recv() => match event {
                    Ok(ConnectionEvent::CredsUpdate) => {
                        if let Err(e) = client.save_credentials().await {
                            tracing::warn!(number = %number, error = %e, "credential flush failed");
                        }
                    }
                    Ok(ConnectionEvent::Close { reason }) => {
                        let _ = self.store.remove(&number);
                        Self::clear_generation(&self.generations, &number, generation).await;
                        tracing::warn!(number = %number, reason = %reason, state = ?PairingState::Failed, "closed before code request");
                        return Err(PairingError::ClosedBeforeCode { reason }.into());
                    }
                    Ok(ConnectionEvent::Open) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        }

        state = PairingState::CodeRequested;
        tracing::debug!(number = %number, state = ?state, "requesting pairing code");

        let raw_code = match client.request_pairing_code(&number).await {
            Ok(code) => code,
            Err(e) => {
                client.disconnect().await;
                let _ = self.store.remove(&number);
                Self::clear_generation(&self.generations, &number, generation).await;
                tracing::warn!(number = %number, error = %e, state = ?PairingState::Failed, "pairing code request failed");
                return Err(PairingError::Wa(e).into());
            }
        };

        let code = format_code(&raw_code);
        self.cache.put(&number, code.clone()).await;

        state = PairingState::WaitingForLink;
        tracing::info!(number = %number, state = ?state, "pairing code issued");

        self.spawn_link_watcher(client, events, number, generation);
        Ok(PairingOutcome::Code(code))
    }

    /// Periodically sweep expired codes and reap their session directories.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick fires immediately; nothing can be expired yet.
            timer.tick().await;
            loop {
                timer.tick().await;
                let evicted = cache.sweep().await;
                for number in &evicted {
                    if let Err(e) = store.remove_raw(number) {
                        tracing::warn!(number = %number, error = %e, "failed to reap session directory");
                    }
                }
                if !evicted.is_empty() {
                    tracing::info!(count = evicted.len(), "swept expired pairing codes");
                }
            }
        })
    }

    async fn bump_generation(&self, number: &PhoneNumber) -> u64 {
        let mut generations = self.generations.write().await;
        let entry = generations.entry(number.as_str().to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    async fn is_stale(
        generations: &Arc<RwLock<HashMap<String, u64>>>,
        number: &PhoneNumber,
        generation: u64,
    ) -> bool {
        generations
            .read()
            .await
            .get(number.as_str())
            .is_none_or(|current| *current != generation)
    }

    /// Drop the generation entry for a finished attempt. A no-op when a
    /// newer attempt owns the entry.
    async fn clear_generation(
        generations: &Arc<RwLock<HashMap<String, u64>>>,
        number: &PhoneNumber,
        generation: u64,
    ) {
        let mut generations = generations.write().await;
        if generations.get(number.as_str()) == Some(&generation) {
            generations.remove(number.as_str());
        }
    }

    /// Watch connection events after a code was issued.
    ///
    /// `Open` delivers the credential file to the user's own address and
    /// tears everything down; `Close` is cleanup only at this point (the
    /// code already reached the caller). A watcher whose attempt has been
    /// replaced must not touch state owned by the newer attempt.
    fn spawn_link_watcher(
        &self,
        client: Arc<dyn WaClient>,
        mut events: broadcast::Receiver<ConnectionEvent>,
        number: PhoneNumber,
        generation: u64,
    ) {
        let cache = self.cache.clone();
        let store = self.store.clone();
        let generations = self.generations.clone();
        let post_open_delay = self.post_open_delay;
        // A link can only happen while the code is still valid, so the
        // watcher never needs to outlive the TTL.
        let deadline = tokio::time::Instant::now() + self.code_ttl;

        tokio::spawn(async move {
            loop {
                let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(Ok(event)) => event,
                    Ok(Err(RecvError::Lagged(skipped))) => {
                        tracing::warn!(number = %number, skipped, "event stream lagged");
                        continue;
                    }
                    Ok(Err(RecvError::Closed)) => ConnectionEvent::Close {
                        reason: "event stream ended".to_string(),
                    },
                    Err(_) => {
                        client.disconnect().await;
                        Self::clear_generation(&generations, &number, generation).await;
                        tracing::info!(number = %number, "code expired without a link, watcher stopped");
                        return;
                    }
                };

                match event {
                    ConnectionEvent::CredsUpdate => {
                        if let Err(e) = client.save_credentials().await {
                            tracing::warn!(number = %number, error = %e, "credential flush failed");
                        }
                    }
                    ConnectionEvent::Open => {
                        if Self::is_stale(&generations, &number, generation).await {
                            tracing::debug!(number = %number, generation, "stale attempt linked, ignoring");
                            client.disconnect().await;
                            return;
                        }

                        match store.read_credentials(&number) {
                            Ok(bytes) => {
                                let result = client
                                    .send_document(&number.own_jid(), CREDS_FILE, bytes, CREDS_CAPTION)
                                    .await;
                                match result {
                                    Ok(()) => {
                                        tracing::info!(number = %number, "credential file delivered")
                                    }
                                    // No retry; cleanup below still runs.
                                    Err(e) => {
                                        tracing::warn!(number = %number, error = %e, "credential delivery failed")
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(number = %number, error = %e, "credential file unreadable")
                            }
                        }

                        tokio::time::sleep(post_open_delay).await;
                        if !Self::is_stale(&generations, &number, generation).await {
                            if let Err(e) = store.remove(&number) {
                                tracing::warn!(number = %number, error = %e, "session cleanup failed");
                            }
                            cache.remove(&number).await;
                            Self::clear_generation(&generations, &number, generation).await;
                        }
                        client.disconnect().await;
                        tracing::info!(number = %number, state = ?PairingState::Done, "pairing attempt finished");
                        return;
                    }
                    ConnectionEvent::Close { reason } => {
                        client.disconnect().await;
                        if Self::is_stale(&generations, &number, generation).await {
                            tracing::debug!(number = %number, generation, "stale attempt closed, ignoring");
                            return;
                        }
                        if let Err(e) = store.remove(&number) {
                            tracing::warn!(number = %number, error = %e, "session cleanup failed");
                        }
                        Self::clear_generation(&generations, &number, generation).await;
                        // The code already reached the caller; a close here
                        // is late, so this is cleanup rather than failure.
                        tracing::info!(number = %number, reason = %reason, state = ?PairingState::Done, "connection closed after code issuance");
                        return;
                    }
                }
            }
        });
    }
}
