use std::fmt;
use thiserror::Error;

use crate::address::HostPort;
use super::CorrelationId;

/// Network-level classification of a failed send.
///
/// Only `Timeout` and `Unreachable` are worth a fresh resolution: they mean
/// the resolved address itself may have gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// The request did not complete within the transport timeout
    Timeout,
    /// Connection refused, no route to host, network unreachable
    Unreachable,
    /// Anything else (protocol errors, body errors, ...)
    Other,
}

impl fmt::Display for SendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendErrorKind::Timeout => f.write_str("timeout"),
            SendErrorKind::Unreachable => f.write_str("unreachable"),
            SendErrorKind::Other => f.write_str("other"),
        }
    }
}

/// A failure reported by the underlying transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error sending to {address}: {message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub address: String,
    pub message: String,
}

impl SendError {
    pub fn new(kind: SendErrorKind, address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn timeout(address: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Timeout, address, "request timed out")
    }

    pub fn unreachable(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Unreachable, address, message)
    }

    /// Whether this failure warrants re-resolving the destination.
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, SendErrorKind::Timeout | SendErrorKind::Unreachable)
    }
}

/// Middleware phase, relative to destination resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeResolution,
    AfterResolution,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::BeforeResolution => f.write_str("before-resolution"),
            Phase::AfterResolution => f.write_str("after-resolution"),
        }
    }
}

/// Coarse grouping of [`WaypointError`] used by callers deciding what to do
/// with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient network condition; the same request may succeed later
    RetriableNetwork,
    /// The registry could not answer or answered with a failure status
    Resolution,
    /// Missing or malformed client configuration
    Configuration,
    /// The caller broke the client contract
    Usage,
    Other,
}

#[derive(Error, Debug)]
pub enum WaypointError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Middleware '{id}' is already registered for the {phase} phase")]
    DuplicateMiddleware { id: String, phase: Phase },

    #[error("Malformed destination: {0}")]
    MalformedDestination(String),

    #[error(
        "Registry returned status {status} while resolving {address} \
         (correlation id {correlation_id}, {elapsed_ms}ms elapsed)"
    )]
    RegistryStatus {
        status: u16,
        address: HostPort,
        correlation_id: CorrelationId,
        elapsed_ms: u64,
    },

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl WaypointError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WaypointError::Send(e) if e.is_retriable() => ErrorCategory::RetriableNetwork,
            WaypointError::RegistryStatus { .. }
            | WaypointError::RegistryUnavailable(_)
            | WaypointError::InvalidResponse(_) => ErrorCategory::Resolution,
            WaypointError::Configuration(_) => ErrorCategory::Configuration,
            WaypointError::DuplicateMiddleware { .. } | WaypointError::MalformedDestination(_) => {
                ErrorCategory::Usage
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Shorthand for `category() == RetriableNetwork`.
    pub fn is_retriable(&self) -> bool {
        self.category() == ErrorCategory::RetriableNetwork
    }
}

impl From<http::Error> for WaypointError {
    fn from(err: http::Error) -> Self {
        WaypointError::MalformedDestination(err.to_string())
    }
}

impl From<http::uri::InvalidUri> for WaypointError {
    fn from(err: http::uri::InvalidUri) -> Self {
        WaypointError::MalformedDestination(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WaypointError>;
