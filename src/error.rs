//! Error types for the GiveCare core.

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Assessment error: {0}")]
    Assessment(#[from] AssessmentError),

    #[error("Recurrence error: {0}")]
    Recurrence(#[from] RecurrenceError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("SMS error: {0}")]
    Sms(#[from] SmsError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Inbound webhook validation errors. Fatal — abort before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing webhook signature header")]
    MissingSignature,

    #[error("Invalid webhook signature for {url}")]
    InvalidSignature { url: String },

    #[error("Signature validation is not configured: {0}")]
    NotConfigured(String),
}

/// Assessment session state errors. Surfaced to the user in-band, never a crash.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("No assessment session is in progress")]
    NoActiveSession,

    #[error("Assessment session {0} is already complete")]
    SessionComplete(Uuid),
}

/// Recurrence rule errors. Rejected synchronously at trigger creation.
#[derive(Debug, thiserror::Error)]
pub enum RecurrenceError {
    #[error("Invalid recurrence rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Unknown IANA timezone: {0}")]
    UnknownTimezone(String),
}

/// Delegated agent-execution errors. Caught at the pipeline boundary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent execution failed: {0}")]
    Execution(String),

    #[error("Agent returned no reply")]
    EmptyReply,
}

/// Outbound SMS dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("SMS send to {to} failed: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("SMS transport not configured: {0}")]
    NotConfigured(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
