//! Error types for dialer-core
//!
//! Errors fall into four groups, matching how the operator experiences them:
//!
//! - **Configuration** - missing caller ID, missing prompt, empty queue. These
//!   block `start()` and leave the queue untouched.
//! - **Readiness** - the voice device is not registered or has become
//!   unusable. A device that is merely not ready blocks `start()`; a device
//!   that becomes unusable mid-run halts the whole sequence.
//! - **Per-call** - busy, no answer, rejected, network failure while
//!   dispatching. These are recorded on the contact and the queue moves on.
//! - **Transfer** - a redirect of the active call failed. Surfaced to the
//!   operator while the call itself continues.

use thiserror::Error;

/// Result type for dialer operations
pub type DialerResult<T> = Result<T, DialerError>;

/// Errors that can occur while importing contacts or sequencing calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialerError {
    /// Start was requested with no contacts loaded
    #[error("No contacts in queue: upload contacts first")]
    EmptyQueue,

    /// No caller-ID number has been selected
    #[error("No caller ID selected: choose a from number before starting")]
    MissingCallerId,

    /// IVR blast mode needs a message to play
    #[error("IVR blast requires a prompt message")]
    MissingPrompt,

    /// Every contact in the queue has already been settled
    #[error("Queue exhausted: reset the queue to dial again")]
    QueueExhausted,

    /// The sequencer is already placing calls
    #[error("Sequencer is already running")]
    AlreadyRunning,

    /// Operation not valid in the current sequencer state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Illegal contact status transition
    #[error("Invalid transition for contact {contact_id}: {from} on {event}")]
    InvalidTransition {
        contact_id: usize,
        from: String,
        event: String,
    },

    /// Voice device has not completed registration
    #[error("Voice device not ready: {reason}")]
    DeviceNotReady { reason: String },

    /// Voice device cannot place calls at all (permissions, revoked token, ...)
    #[error("Voice device unusable: {reason}")]
    DeviceUnusable { reason: String },

    /// Transport-level failure talking to the backend
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// Backend answered with a non-success status
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// Operation timed out
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Redirecting the active call failed; the call continues
    #[error("Transfer failed: {reason}")]
    TransferFailed { reason: String },

    /// Transfer requested with no call in progress
    #[error("No active call to transfer")]
    NoActiveCall,

    /// Contact file could not be imported
    #[error("Import error: {reason}")]
    Import { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DialerError {
    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// Create an import error
    pub fn import(reason: impl Into<String>) -> Self {
        Self::Import {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this error means the calling client itself is unusable, so
    /// continuing would only burn through the queue
    pub fn halts_sequence(&self) -> bool {
        matches!(self, Self::DeviceUnusable { .. })
    }

    /// Whether this error blocks `start()` until the operator fixes something
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQueue
                | Self::MissingCallerId
                | Self::MissingPrompt
                | Self::InvalidConfiguration { .. }
        )
    }

    /// Short category label for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyQueue
            | Self::MissingCallerId
            | Self::MissingPrompt
            | Self::InvalidConfiguration { .. } => "configuration",
            Self::QueueExhausted
            | Self::AlreadyRunning
            | Self::InvalidState { .. }
            | Self::InvalidTransition { .. }
            | Self::NoActiveCall => "state",
            Self::DeviceNotReady { .. } | Self::DeviceUnusable { .. } => "device",
            Self::Network { .. } | Self::Timeout { .. } => "network",
            Self::Backend { .. } => "backend",
            Self::TransferFailed { .. } => "transfer",
            Self::Import { .. } => "import",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Attach operation context to a failing result
///
/// The context is folded into the error message; the variant is kept so
/// `is_recoverable()` and `halts_sequence()` still see the original kind.
pub trait ErrorContext<T> {
    /// Add a fixed context string to the error
    fn context(self, context: &str) -> DialerResult<T>;

    /// Add a lazily built context string to the error
    fn with_context<F>(self, f: F) -> DialerResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for DialerResult<T> {
    fn context(self, context: &str) -> DialerResult<T> {
        self.map_err(|e| add_context(e, context))
    }

    fn with_context<F>(self, f: F) -> DialerResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            add_context(e, &context)
        })
    }
}

fn add_context(error: DialerError, context: &str) -> DialerError {
    tracing::debug!(category = error.category(), %error, context, "Adding error context");
    match error {
        DialerError::Network { reason } => DialerError::Network {
            reason: format!("{context}: {reason}"),
        },
        DialerError::Backend { status, message } => DialerError::Backend {
            status,
            message: format!("{context}: {message}"),
        },
        DialerError::TransferFailed { reason } => DialerError::TransferFailed {
            reason: format!("{context}: {reason}"),
        },
        DialerError::Import { reason } => DialerError::Import {
            reason: format!("{context}: {reason}"),
        },
        DialerError::Internal { message } => DialerError::Internal {
            message: format!("{context}: {message}"),
        },
        other => other,
    }
}

impl From<csv::Error> for DialerError {
    fn from(err: csv::Error) -> Self {
        Self::import(err.to_string())
    }
}

impl From<config::ConfigError> for DialerError {
    fn from(err: config::ConfigError) -> Self {
        Self::config("config", err.to_string())
    }
}

impl From<reqwest::Error> for DialerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "http request".to_string()),
            };
        }
        if let Some(status) = err.status() {
            return Self::Backend {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        Self::network(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for DialerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Timeout {
            operation: err.to_string(),
        }
    }
}
