//! Error types for cfsync
//!
//! Three failure families exist, one per collaborator:
//!
//! - [`ConfigError`]: the environment could not be turned into a [`Config`](crate::Config).
//!   Fatal at startup.
//! - [`ResolutionError`]: the public address of one family could not be determined.
//!   Fails every pair of that family for the current cycle only.
//! - [`StoreError`]: a call to the DNS provider failed. Only
//!   [`StoreError::Unauthorized`] aborts a cycle; everything else is retried by
//!   the next scheduled cycle.

use std::time::Duration;

use thiserror::Error;

use crate::traits::AddressFamily;

/// Result type alias for cfsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Public IP resolution errors
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// DNS provider errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Invalid or missing configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent or blank
    #[error("missing required setting {0}")]
    MissingRequired(&'static str),

    /// A key is present but its value cannot be used
    #[error("invalid value for {key} ({value:?}): {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Both IPv4 and IPv6 reconciliation are disabled
    #[error("neither CF_IPV4_ENABLED nor CF_IPV6_ENABLED is true; nothing to reconcile")]
    NoFamilyEnabled,
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to determine the current public address of one family
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The echo service could not be reached or answered with an error status
    #[error("address lookup failed: {0}")]
    Transport(String),

    /// The echo service answered with something that is not an address of the requested family
    #[error("malformed address response: {0}")]
    MalformedResponse(String),
}

impl ResolutionError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}

/// Failure of a DNS provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Token rejected. Retrying with the same token cannot succeed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Provider asked us to slow down
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Zone or record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one record matches (domain, type); refusing to guess
    #[error("{count} {} records exist for {domain}; refusing to pick one", .family.record_type())]
    AmbiguousRecord {
        domain: String,
        family: AddressFamily,
        count: usize,
    },

    /// Network failure or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider-side failure (5xx, unexpected status or payload)
    #[error("provider fault: {0}")]
    ProviderFault(String),
}

impl StoreError {
    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a provider fault
    pub fn provider_fault(msg: impl Into<String>) -> Self {
        Self::ProviderFault(msg.into())
    }

    /// Whether this error must abort the rest of the cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Whether the next scheduled cycle may succeed without operator action
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
