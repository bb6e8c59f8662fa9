//! Error category classification for unified error handling.
//!
//! Categories drive retry decisions and the message shown next to a form
//! field or readiness banner.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, DNS, timeout. Transient.
    Network,

    /// Missing or rejected credentials.
    /// Resolved by the identity signing in again.
    Auth,

    /// Data store or identity provider failures (HTTP 5xx).
    Server,

    /// Malformed responses or programming errors. Not retryable.
    Client,

    /// User action required (invalid input, wrong verification code).
    User,

    /// Missing endpoints or keys in the environment.
    Configuration,
}

impl ErrorCategory {
    /// Network and server failures are worth retrying; the refresh tick
    /// does so on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Server)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::User => "user",
            ErrorCategory::Configuration => "configuration",
        }
    }

    /// What the user can do about it.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Check your internet connection and try again",
            ErrorCategory::Auth => "Sign in again to get a fresh session",
            ErrorCategory::Server => "The store or sign-in service is unavailable. Try again shortly",
            ErrorCategory::Client => "Unexpected response from the service",
            ErrorCategory::User => "Check the highlighted field and try again",
            ErrorCategory::Configuration => "Check the IDMIRROR_* environment variables",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
