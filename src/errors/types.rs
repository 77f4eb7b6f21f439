//! Error type definitions for the Stalker relay
//!
//! This module defines the error taxonomy shared by the portal client, the
//! relay servers and the orchestrator.

use std::fmt;

use thiserror::Error;

use crate::utils::url::UrlUtils;

/// Raw portal response body kept for diagnostics.
///
/// Portal responses may echo credentials back, so the body never shows up in
/// `Display` or `Debug` output; only its length does.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawBody(String);

impl RawBody {
    pub fn new<S: Into<String>>(body: S) -> Self {
        Self(body.into())
    }

    /// Explicit access for diagnostics tooling.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RawBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawBody(<{} bytes>)", self.0.len())
    }
}

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the relay.
/// It uses `thiserror` to provide automatic error trait implementations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid profile or process configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The portal response did not match the envelope of the action attempted
    #[error("Protocol error: {action} - {message}")]
    Protocol {
        action: String,
        message: String,
        raw_body: RawBody,
    },

    /// The portal rejected the configured identity
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Connection, timeout or upstream 5xx failures
    #[error("Transient network error: {message}")]
    TransientNetwork { message: String },

    /// The portal returned zero channels
    #[error("no IPTV channels retrieved")]
    EmptyCatalog,

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// A relay listener could not bind its address
    #[error("Failed to bind {service} on {addr}: {source}")]
    Bind {
        service: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a protocol error, keeping the raw body out of log output
    pub fn protocol<A: Into<String>, M: Into<String>>(
        action: A,
        message: M,
        raw_body: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            action: action.into(),
            message: message.into(),
            raw_body: RawBody::new(raw_body),
        }
    }

    /// Create an invalid credentials error carrying the portal's reason
    pub fn invalid_credentials<S: Into<String>>(message: S) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    /// Create a transient network error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a reqwest failure.
    ///
    /// Connect, timeout and request-level failures are transient; a body that
    /// could not be decoded is a protocol violation of `action`.
    pub fn from_reqwest(action: &str, err: reqwest::Error) -> Self {
        let message = UrlUtils::obfuscate_credentials(&err.to_string());
        if err.is_decode() {
            return Self::protocol(action, message, String::new());
        }
        if let Some(status) = err.status() {
            return Self::from_status(action, status, String::new());
        }
        Self::transient(message)
    }

    /// Classify a non-success upstream HTTP status.
    pub fn from_status(action: &str, status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::transient(format!("{action}: upstream responded {status}"))
        } else {
            Self::protocol(action, format!("unexpected HTTP status {status}"), body)
        }
    }

    /// Whether retrying the failed operation can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}
