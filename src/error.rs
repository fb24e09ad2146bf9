//! Error types for chat-enroll.

/// Top-level error type returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid form definition {form}: {reason}")]
    InvalidForm { form: String, reason: String },
}

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to delete message on channel {name}: {reason}")]
    DeleteFailed { name: String, reason: String },
}

/// Form engine errors surfaced to callers.
///
/// Malformed answers are not errors: they are rejections handled inside the
/// engine with a re-prompt.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Conversation {conversation_id} already has an active form: {form}")]
    Conflict {
        conversation_id: String,
        form: String,
    },

    #[error("Form {0} is not registered")]
    UnknownForm(String),
}

/// Errors raised by form completion handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Missing value for field {0}")]
    MissingField(String),

    #[error("Handler {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Failures of a single call to the remote API.
///
/// Request retries never surface these: `ApiClient::request` folds them into
/// its returned `ApiResponse`. They are used by `authenticate()` for logging.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {route} failed: {source}")]
    Transport {
        route: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{route} returned {status}")]
    Status {
        route: String,
        status: reqwest::StatusCode,
    },

    #[error("Login response did not contain a token")]
    MissingToken,
}
