//! Email-code signup.
//!
//! Submitting the form creates a pending signup with the identity provider,
//! which emails a code. Verifying the code completes the signup, writes the
//! profile row with the chosen username and activates the new session.

use std::sync::Arc;
use thiserror::Error;

use crate::profile::{Identity, ProfileRecord, ProfileService, ProfileSyncOutcome, ProfileUpdate};
use crate::traits::{DataStore, IdentityError, IdentityProvider, SignupAttributes};
use crate::validation::ValidationState;

/// Message shown when the provider did not complete the verification.
pub const VERIFICATION_FAILED_MESSAGE: &str = "Verification failed. Please try again.";

/// Where the signup stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationState {
    /// Form not submitted yet.
    #[default]
    Default,
    /// Code sent; waiting for the user to enter it.
    Pending,
    Success,
    /// Last verification attempt failed; the user may try another code.
    Failed,
}

/// Reasons a signup step was refused.
#[derive(Debug, Clone, Error)]
pub enum SignupError {
    #[error("Username is required")]
    UsernameRequired,

    #[error("Please choose a valid username")]
    InvalidUsername,

    #[error("First name is required")]
    FirstNameRequired,

    #[error("Last name is required")]
    LastNameRequired,

    #[error("Email is required")]
    EmailRequired,

    #[error("Password is required")]
    PasswordRequired,

    #[error("No signup is awaiting verification")]
    NotPending,

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl SignupError {
    /// Message suitable for display next to the form.
    pub fn user_message(&self) -> String {
        match self {
            SignupError::Identity(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Signup form contents.
#[derive(Clone, Default, PartialEq)]
pub struct SignupForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    /// Lowercase and trim the username and email, as the form fields do.
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_lowercase();
        self.email = self.email.trim().to_lowercase();
        self
    }

    /// Check required fields and the live username verdict.
    ///
    /// The verdict must be `Valid` for exactly this username.
    pub fn validate(&self, username_state: &ValidationState) -> Result<(), SignupError> {
        if self.username.trim().is_empty() {
            return Err(SignupError::UsernameRequired);
        }
        if !username_state.is_valid() || username_state.input_value != self.username.trim() {
            return Err(SignupError::InvalidUsername);
        }
        if self.first_name.trim().is_empty() {
            return Err(SignupError::FirstNameRequired);
        }
        if self.last_name.trim().is_empty() {
            return Err(SignupError::LastNameRequired);
        }
        if self.email.trim().is_empty() {
            return Err(SignupError::EmailRequired);
        }
        if self.password.trim().is_empty() {
            return Err(SignupError::PasswordRequired);
        }
        Ok(())
    }

    fn attributes(&self) -> SignupAttributes {
        SignupAttributes {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email_address: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Drives one signup from form submission to an active session.
pub struct SignupFlow {
    identity_provider: Arc<dyn IdentityProvider>,
    profiles: ProfileService,
    state: VerificationState,
    error: Option<String>,
    form: Option<SignupForm>,
    pending_signup_id: Option<String>,
    created_identity_id: Option<String>,
    created_session_id: Option<String>,
}

impl SignupFlow {
    pub fn new(identity_provider: Arc<dyn IdentityProvider>, store: Arc<dyn DataStore>) -> Self {
        Self {
            identity_provider,
            profiles: ProfileService::new(store),
            state: VerificationState::Default,
            error: None,
            form: None,
            pending_signup_id: None,
            created_identity_id: None,
            created_session_id: None,
        }
    }

    pub fn state(&self) -> VerificationState {
        self.state
    }

    /// Message for the last failure, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn pending_signup_id(&self) -> Option<&str> {
        self.pending_signup_id.as_deref()
    }

    /// Subject id of the identity created by a successful verification.
    pub fn created_identity_id(&self) -> Option<&str> {
        self.created_identity_id.as_deref()
    }

    pub fn created_session_id(&self) -> Option<&str> {
        self.created_session_id.as_deref()
    }

    /// The identity created by a successful signup.
    pub fn identity(&self) -> Option<Identity> {
        let form = self.form.as_ref()?;
        let identity = Identity::new(self.created_identity_id.clone()?)
            .with_email(form.email.clone())
            .with_name(form.first_name.clone(), form.last_name.clone());
        Some(identity)
    }

    /// Create the pending signup and send the verification code.
    ///
    /// Fails without contacting the provider unless every field is filled
    /// and `username_state` is `Valid` for the submitted username.
    pub async fn submit(
        &mut self,
        form: SignupForm,
        username_state: &ValidationState,
    ) -> Result<(), SignupError> {
        let form = form.normalized();
        if let Err(err) = form.validate(username_state) {
            self.error = Some(err.user_message());
            return Err(err);
        }

        match self
            .identity_provider
            .create_pending_signup(&form.attributes())
            .await
        {
            Ok(pending_signup_id) => {
                tracing::info!(
                    username = %form.username,
                    signup_id = %pending_signup_id,
                    "Verification code sent"
                );
                self.pending_signup_id = Some(pending_signup_id);
                self.form = Some(form);
                self.error = None;
                self.state = VerificationState::Pending;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Signup creation failed");
                let err = SignupError::from(err);
                self.error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Attempt verification with the emailed `code`.
    ///
    /// On completion the profile row is written before the session is
    /// activated. Provider rejections leave the flow in `Failed` with a
    /// user message; another code may be tried.
    pub async fn verify(&mut self, code: &str) -> Result<VerificationState, SignupError> {
        let (Some(pending_signup_id), Some(form)) =
            (self.pending_signup_id.clone(), self.form.clone())
        else {
            return Err(SignupError::NotPending);
        };
        if self.state == VerificationState::Success {
            return Ok(self.state);
        }

        let outcome = match self
            .identity_provider
            .verify_code(&pending_signup_id, code.trim())
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, signup_id = %pending_signup_id, "Verification attempt failed");
                return Ok(self.fail(err.user_message()));
            }
        };

        let (true, Some(identity_id)) = (outcome.is_complete(), outcome.created_identity_id) else {
            return Ok(self.fail(VERIFICATION_FAILED_MESSAGE.to_string()));
        };

        self.write_profile(&identity_id, &form).await;

        if let Some(ref session_id) = outcome.created_session_id {
            if let Err(err) = self.identity_provider.establish_session(session_id).await {
                tracing::warn!(error = %err, "Session activation failed");
                return Ok(self.fail(err.user_message()));
            }
        }

        tracing::info!(subject_id = %identity_id, "Signup complete");
        self.created_identity_id = Some(identity_id);
        self.created_session_id = outcome.created_session_id;
        self.error = None;
        self.state = VerificationState::Success;
        Ok(self.state)
    }

    fn fail(&mut self, message: String) -> VerificationState {
        self.error = Some(message);
        self.state = VerificationState::Failed;
        self.state
    }

    /// Create the profile row carrying the chosen username.
    ///
    /// If the row already exists (the synchronizer got there first) only
    /// the username is filled in. A failure here is logged, not surfaced:
    /// the identity exists and the synchronizer recreates the row on the
    /// next sign-in.
    async fn write_profile(&self, identity_id: &str, form: &SignupForm) {
        let identity = Identity::new(identity_id)
            .with_email(form.email.clone())
            .with_name(form.first_name.clone(), form.last_name.clone());
        let record = ProfileRecord::from_identity(&identity).with_username(form.username.clone());

        let result = match self.profiles.create_if_absent(&record).await {
            Ok(ProfileSyncOutcome::Created) => Ok(()),
            Ok(ProfileSyncOutcome::AlreadyPresent) => {
                let update = ProfileUpdate {
                    username: Some(form.username.clone()),
                    ..Default::default()
                };
                self.profiles.update(identity_id, &update).await.map(|_| ())
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            tracing::warn!(subject_id = %identity_id, error = %err, "Failed to write profile after signup");
        }
    }
}

impl std::fmt::Debug for SignupFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupFlow")
            .field("state", &self.state)
            .field("pending_signup_id", &self.pending_signup_id)
            .field("error", &self.error)
            .finish()
    }
}
