//! Error types for pairgate.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Phone number error: {0}")]
    Phone(#[from] PhoneError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Protocol client error: {0}")]
    Wa(#[from] WaError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Phone number normalization/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PhoneError {
    #[error("Invalid phone number: {input}")]
    Invalid { input: String },
}

/// Session directory errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Credential file not found for {number}")]
    CredentialsNotFound { number: String },

    #[error("IO error for session {number}: {source}")]
    Io {
        number: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the external protocol client.
#[derive(Debug, thiserror::Error)]
pub enum WaError {
    #[error("Failed to open protocol session: {reason}")]
    OpenFailed { reason: String },

    #[error("Pairing code request failed: {reason}")]
    CodeRequestFailed { reason: String },

    #[error("Failed to send message to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Failed to persist credentials: {reason}")]
    PersistFailed { reason: String },

    #[error("Client is not connected")]
    NotConnected,
}

/// Pairing orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Connection closed before a pairing code was issued: {reason}")]
    ClosedBeforeCode { reason: String },

    #[error("Protocol client error: {0}")]
    Wa(#[from] WaError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server failed to start: {reason}")]
    StartupFailed { reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
