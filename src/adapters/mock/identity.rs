//! Scripted identity provider for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::traits::{IdentityError, IdentityProvider, SignupAttributes, VerificationOutcome};

/// Scripted identity provider for testing.
///
/// Credentials come from a queue of scripted answers, falling back to a
/// fixed answer (no credential by default). Signup and verification ids are
/// generated unless an outcome is scripted.
///
/// # Example
///
/// ```ignore
/// use idmirror::adapters::mock::MockIdentityProvider;
///
/// let identity = MockIdentityProvider::new().with_token("jwt-1");
/// identity.push_token(Some("jwt-2"));
///
/// // First call answers "jwt-2", every later call "jwt-1"
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    /// One-shot credential answers, consumed first
    scripted_tokens: Arc<Mutex<VecDeque<Option<String>>>>,
    /// Answer once the script is exhausted
    token: Arc<Mutex<Option<String>>>,
    acquire_error: Arc<Mutex<Option<IdentityError>>>,
    acquire_delay: Arc<Mutex<Duration>>,
    templates_requested: Arc<Mutex<Vec<String>>>,
    signups: Arc<Mutex<Vec<SignupAttributes>>>,
    signup_error: Arc<Mutex<Option<IdentityError>>>,
    verification_outcome: Arc<Mutex<Option<VerificationOutcome>>>,
    verify_error: Arc<Mutex<Option<IdentityError>>>,
    verify_attempts: Arc<Mutex<Vec<(String, String)>>>,
    sessions: Arc<Mutex<Vec<String>>>,
    session_error: Arc<Mutex<Option<IdentityError>>>,
}

impl MockIdentityProvider {
    /// Create a provider with no active session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every credential request with `token`.
    pub fn with_token(self, token: &str) -> Self {
        self.set_token(Some(token));
        self
    }

    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().unwrap() = token.map(str::to_string);
    }

    /// Queue a one-shot credential answer.
    pub fn push_token(&self, token: Option<&str>) {
        self.scripted_tokens
            .lock()
            .unwrap()
            .push_back(token.map(str::to_string));
    }

    /// Make credential requests fail (or stop failing with `None`).
    pub fn set_acquire_error(&self, error: Option<IdentityError>) {
        *self.acquire_error.lock().unwrap() = error;
    }

    /// Delay every credential request.
    pub fn set_acquire_delay(&self, delay: Duration) {
        *self.acquire_delay.lock().unwrap() = delay;
    }

    /// Number of credential requests received.
    pub fn acquire_count(&self) -> usize {
        self.templates_requested.lock().unwrap().len()
    }

    /// Templates passed to `acquire_credential`, in order.
    pub fn templates_requested(&self) -> Vec<String> {
        self.templates_requested.lock().unwrap().clone()
    }

    /// Attributes of every pending signup created.
    pub fn signups(&self) -> Vec<SignupAttributes> {
        self.signups.lock().unwrap().clone()
    }

    pub fn set_signup_error(&self, error: Option<IdentityError>) {
        *self.signup_error.lock().unwrap() = error;
    }

    /// Answer verification attempts with `outcome`.
    pub fn set_verification_outcome(&self, outcome: VerificationOutcome) {
        *self.verification_outcome.lock().unwrap() = Some(outcome);
    }

    pub fn set_verify_error(&self, error: Option<IdentityError>) {
        *self.verify_error.lock().unwrap() = error;
    }

    /// `(pending_signup_id, code)` of every verification attempt.
    pub fn verify_attempts(&self) -> Vec<(String, String)> {
        self.verify_attempts.lock().unwrap().clone()
    }

    /// Sessions activated with `establish_session`, in order.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn set_session_error(&self, error: Option<IdentityError>) {
        *self.session_error.lock().unwrap() = error;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn acquire_credential(&self, template: &str) -> Result<Option<String>, IdentityError> {
        self.templates_requested
            .lock()
            .unwrap()
            .push(template.to_string());

        let delay = *self.acquire_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.acquire_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(token) = self.scripted_tokens.lock().unwrap().pop_front() {
            return Ok(token);
        }
        Ok(self.token.lock().unwrap().clone())
    }

    async fn create_pending_signup(
        &self,
        attributes: &SignupAttributes,
    ) -> Result<String, IdentityError> {
        if let Some(err) = self.signup_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.signups.lock().unwrap().push(attributes.clone());
        Ok(format!("sua_{}", Uuid::new_v4().simple()))
    }

    async fn verify_code(
        &self,
        pending_signup_id: &str,
        code: &str,
    ) -> Result<VerificationOutcome, IdentityError> {
        self.verify_attempts
            .lock()
            .unwrap()
            .push((pending_signup_id.to_string(), code.to_string()));

        if let Some(err) = self.verify_error.lock().unwrap().clone() {
            return Err(err);
        }
        let scripted = self.verification_outcome.lock().unwrap().clone();
        Ok(scripted.unwrap_or_else(|| {
            VerificationOutcome::complete(
                format!("user_{}", Uuid::new_v4().simple()),
                format!("sess_{}", Uuid::new_v4().simple()),
            )
        }))
    }

    async fn establish_session(&self, session_id: &str) -> Result<(), IdentityError> {
        if let Some(err) = self.session_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.sessions.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}
