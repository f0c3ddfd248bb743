//! Error types for access
//!
//! The variants mirror the failure taxonomy shared by the sync path, the
//! discovery engine and every provider backend. Benign outcomes such as an
//! unchanged address or a busy run-lock are *not* errors; they are reported
//! through [`crate::sync::SyncOutcome`].

use thiserror::Error;

/// Result type alias for access operations
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit code for success or a benign skip
pub const EXIT_OK: u8 = 0;

/// Process exit code for a generic failure
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code for missing or incomplete configuration
pub const EXIT_CONFIG_MISSING: u8 = 6;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is absent or incomplete
    #[error("configuration missing: {0}")]
    ConfigMissing(String),

    /// Configuration is present but malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider credentials lack a mandatory field
    #[error("missing credentials for {provider}: {field}")]
    MissingCredentials {
        /// Provider name
        provider: String,
        /// The first missing field
        field: String,
    },

    /// No usable address could be determined
    #[error("no usable {0} address available")]
    AddressUnavailable(String),

    /// Vendor rejected the credentials
    #[error("authentication failed ({provider}): {message}")]
    AuthenticationFailed {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Timeouts, connection failures, 5xx and rate limiting
    #[error("transient network error ({provider}): {message}")]
    TransientNetwork {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Vendor refused the request for a reason other than authentication
    #[error("rejected by provider ({provider}): {message}")]
    RejectedByProvider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Malformed domain, host or address, caught before any network call
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another sync run holds the run-lock
    #[error("another sync run holds the lock at {0}")]
    LockBusy(String),

    /// The slot scan found no free slot
    #[error("no free slot among the first {0} candidates")]
    NoSlotAvailable(u32),

    /// Persisted state could not be read or written
    #[error("state store error: {0}")]
    StateStore(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "configuration missing" error
    pub fn config_missing(msg: impl Into<String>) -> Self {
        Self::ConfigMissing(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-credentials error
    pub fn missing_credentials(provider: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingCredentials {
            provider: provider.into(),
            field: field.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a transient network error
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a provider rejection error
    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RejectedByProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Whether a later cycle could reasonably succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork { .. } | Self::AddressUnavailable(_) | Self::LockBusy(_)
        )
    }

    /// Exit code the CLI reports for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ConfigMissing(_) | Self::Config(_) | Self::MissingCredentials { .. } => {
                EXIT_CONFIG_MISSING
            }
            Self::LockBusy(_) => EXIT_OK,
            _ => EXIT_FAILURE,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
