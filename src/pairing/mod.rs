//! Pairing orchestration.
//!
//! One state machine per phone number, driving the external protocol
//! client from "open a fresh session" through "code issued" to either
//! credential delivery or failure, with unconditional cleanup on every
//! exit path.

mod orchestrator;

pub use orchestrator::{
    CREDS_CAPTION, PairingOrchestrator, PairingOutcome, PairingState, format_code,
};
