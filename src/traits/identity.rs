//! Identity provider trait abstraction.
//!
//! The identity provider owns sign-up, email verification and sessions.
//! This crate only ever asks it for short-lived bearer credentials and
//! drives the email-code signup flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::http::HttpError;

/// Attributes submitted when creating a pending signup.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignupAttributes {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
}

impl std::fmt::Debug for SignupAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupAttributes")
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email_address", &self.email_address)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Status of an email-code verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Complete,
    Failed,
}

/// Result of [`IdentityProvider::verify_code`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    /// Subject id of the newly created identity, once complete.
    pub created_identity_id: Option<String>,
    /// Session to activate with [`IdentityProvider::establish_session`].
    pub created_session_id: Option<String>,
}

impl VerificationOutcome {
    /// A completed verification.
    pub fn complete(identity_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            status: VerificationStatus::Complete,
            created_identity_id: Some(identity_id.into()),
            created_session_id: Some(session_id.into()),
        }
    }

    /// A failed verification.
    pub fn failed() -> Self {
        Self {
            status: VerificationStatus::Failed,
            created_identity_id: None,
            created_session_id: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == VerificationStatus::Complete
    }
}

/// Identity provider errors.
#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    /// No active session to mint a credential for.
    #[error("No active identity session")]
    NotSignedIn,

    /// The provider refused the request; `message` is safe to show users.
    #[error("Identity provider rejected the request: {message}")]
    Rejected { code: Option<String>, message: String },

    /// Transport failure.
    #[error("Identity provider request failed: {0}")]
    Http(#[from] HttpError),

    /// The response body could not be interpreted.
    #[error("Invalid identity provider response: {0}")]
    Decode(String),

    #[error("Identity provider error: {0}")]
    Other(String),
}

impl IdentityError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IdentityError::Http(err) if err.is_transient())
    }

    /// Message suitable for display next to a form.
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::NotSignedIn => "You are not signed in. Please sign in to continue.".to_string(),
            IdentityError::Rejected { message, .. } => message.clone(),
            IdentityError::Http(_) => {
                "Unable to reach the sign-in service. Please check your connection.".to_string()
            }
            IdentityError::Decode(_) | IdentityError::Other(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

/// Trait for the external identity provider.
///
/// All calls are asynchronous and fallible. `acquire_credential` returns
/// `Ok(None)` when the provider has no session to mint a token for; that is
/// not an error.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Mint a short-lived bearer credential for `template`.
    async fn acquire_credential(&self, template: &str) -> Result<Option<String>, IdentityError>;

    /// Create a pending signup and send the email verification code.
    ///
    /// Returns the pending signup id.
    async fn create_pending_signup(
        &self,
        attributes: &SignupAttributes,
    ) -> Result<String, IdentityError>;

    /// Attempt to complete a pending signup with the emailed code.
    async fn verify_code(
        &self,
        pending_signup_id: &str,
        code: &str,
    ) -> Result<VerificationOutcome, IdentityError>;

    /// Make `session_id` the active session.
    async fn establish_session(&self, session_id: &str) -> Result<(), IdentityError>;
}
