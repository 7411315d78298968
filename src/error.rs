//! Error types for Meeting Assist.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),
}

/// Configuration-related errors. Mandatory credentials missing at startup
/// fail the process fast with `MissingEnvVar`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox/send connectivity and auth errors.
///
/// Retried locally during ingestion; a cycle degrades to an empty batch
/// rather than crashing the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Mailbox authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("IMAP protocol error: {0}")]
    Imap(String),

    #[error("Failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}

/// Malformed or mis-encoded message errors.
///
/// Per-message only: a decode failure skips the offending message, never
/// the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Message has no parseable headers")]
    UnparseableMessage,

    #[error("Message {id} has no sender address")]
    MissingSender { id: String },

    #[error("Invalid time window: start {start} is not before end {end}")]
    InvalidWindow { start: String, end: String },
}

/// Scheduling/conferencing/language API failures.
///
/// Aborts the affected message's flow and routes it to the failure
/// notification path.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {reason}")]
    Http { service: String, reason: String },

    #[error("{service} returned {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} token exchange failed: {reason}")]
    TokenExchange { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Template resolution errors. Treated like a collaborator failure: the
/// malformed content is never sent.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("Missing template fact: {fact}")]
    MissingFact { fact: String },

    #[error("Unresolved placeholders after substitution: {tokens:?}")]
    UnresolvedPlaceholders { tokens: Vec<String> },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
