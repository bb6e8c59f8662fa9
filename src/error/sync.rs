//! Credential synchronization error types.

use std::fmt;

use crate::traits::{IdentityError, StoreError};

/// Errors surfaced by the credential synchronizer.
///
/// A missing credential is not an error: `ensure_authorized` returns
/// `Ok(None)` for it. Duplicate-key races on profile creation are absorbed
/// and never reach this type.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// No identity is signed in.
    NotSignedIn,

    /// The identity changed while the operation was in flight; its result
    /// was dropped.
    Superseded,

    /// The identity provider failed.
    Identity(IdentityError),

    /// The data store failed.
    Store(StoreError),
}

impl SyncError {
    /// Whether the next refresh tick (or a manual retry) could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NotSignedIn | SyncError::Superseded => false,
            SyncError::Identity(err) => err.is_transient(),
            SyncError::Store(err) => err.is_transient(),
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::NotSignedIn => "Please sign in to continue.".to_string(),
            SyncError::Superseded => "Your session changed. Please try again.".to_string(),
            SyncError::Identity(err) => err.user_message(),
            SyncError::Store(StoreError::Unauthorized(_)) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            SyncError::Store(_) => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::NotSignedIn => "SYNC_NOT_SIGNED_IN",
            SyncError::Superseded => "SYNC_SUPERSEDED",
            SyncError::Identity(IdentityError::NotSignedIn) => "IDENTITY_NOT_SIGNED_IN",
            SyncError::Identity(IdentityError::Rejected { .. }) => "IDENTITY_REJECTED",
            SyncError::Identity(IdentityError::Http(_)) => "IDENTITY_HTTP",
            SyncError::Identity(_) => "IDENTITY_ERROR",
            SyncError::Store(StoreError::Unauthorized(_)) => "STORE_UNAUTHORIZED",
            SyncError::Store(StoreError::Http(_)) => "STORE_HTTP",
            SyncError::Store(_) => "STORE_ERROR",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotSignedIn => write!(f, "No identity signed in"),
            SyncError::Superseded => write!(f, "Identity changed during synchronization"),
            SyncError::Identity(err) => write!(f, "Credential acquisition failed: {}", err),
            SyncError::Store(err) => write!(f, "Profile synchronization failed: {}", err),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Identity(err) => Some(err),
            SyncError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentityError> for SyncError {
    fn from(err: IdentityError) -> Self {
        SyncError::Identity(err)
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Store(err)
    }
}
