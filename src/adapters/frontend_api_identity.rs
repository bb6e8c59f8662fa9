//! Identity provider over a Clerk-style frontend API.
//!
//! Requests are form-encoded, responses are JSON wrapped in a `response`
//! envelope, and failures carry an `errors` array whose first entry is
//! surfaced to the user.

use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::{
    Headers, HttpClient, IdentityError, IdentityProvider, Response, SignupAttributes,
    VerificationOutcome, VerificationStatus,
};

use super::ReqwestHttpClient;

/// Verification strategy used for signups.
pub const EMAIL_CODE_STRATEGY: &str = "email_code";

#[derive(Debug, Deserialize)]
struct TokenBody {
    jwt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct SignUpResource {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_user_id: Option<String>,
    #[serde(default)]
    created_session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    long_message: Option<String>,
}

/// Identity provider backed by the frontend API.
///
/// The active session id is held internally; [`IdentityProvider::establish_session`]
/// replaces it once the provider confirms the session.
pub struct FrontendApiIdentity {
    base_url: String,
    http: Arc<dyn HttpClient>,
    /// Client token for native (cookie-less) clients
    client_token: Option<String>,
    session_id: RwLock<Option<String>>,
}

impl FrontendApiIdentity {
    /// Create a provider backed by [`ReqwestHttpClient`].
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, Arc::new(ReqwestHttpClient::new()))
    }

    /// Create a provider on top of a custom HTTP client.
    pub fn with_http_client(base_url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            client_token: None,
            session_id: RwLock::new(None),
        }
    }

    /// Resume an existing session.
    pub fn with_session(self, session_id: impl Into<String>) -> Self {
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session_id.into());
        self
    }

    /// Authenticate requests with a native client token.
    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }

    /// Active session id, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        if let Some(ref token) = self.client_token {
            headers.insert("Authorization".to_string(), token.clone());
        }
        headers
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response, IdentityError> {
        let url = format!("{}{}", self.base_url, path);
        let body = encode_form(form);
        Ok(self.http.post(&url, &body, &self.headers()).await?)
    }

    async fn post_signup(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<SignUpResource, IdentityError> {
        let response = self.post_form(path, form).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }
        response
            .json::<Envelope<SignUpResource>>()
            .map(|envelope| envelope.response)
            .map_err(|e| IdentityError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for FrontendApiIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendApiIdentity")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id())
            .finish()
    }
}

fn encode_form(form: &[(&str, &str)]) -> String {
    form.iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Turn an error response into [`IdentityError::Rejected`].
fn rejection(response: &Response) -> IdentityError {
    let body: ErrorBody = response.json().unwrap_or_default();
    match body.errors.into_iter().next() {
        Some(err) => IdentityError::Rejected {
            code: err.code,
            message: err
                .long_message
                .or(err.message)
                .unwrap_or_else(|| format!("Request failed ({})", response.status)),
        },
        None => IdentityError::Rejected {
            code: None,
            message: format!("Request failed ({})", response.status),
        },
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FrontendApiIdentity {
    async fn acquire_credential(&self, template: &str) -> Result<Option<String>, IdentityError> {
        let Some(session_id) = self.session_id() else {
            return Ok(None);
        };

        let path = format!(
            "/v1/client/sessions/{}/tokens/{}",
            urlencoding::encode(&session_id),
            urlencoding::encode(template)
        );
        let response = self.post_form(&path, &[]).await?;

        match response.status {
            401 | 404 => {
                tracing::debug!(session_id = %session_id, status = response.status, "No credential for session");
                Ok(None)
            }
            _ if !response.is_success() => Err(rejection(&response)),
            _ => response
                .json::<TokenBody>()
                .map(|body| body.jwt.filter(|jwt| !jwt.is_empty()))
                .map_err(|e| IdentityError::Decode(e.to_string())),
        }
    }

    async fn create_pending_signup(
        &self,
        attributes: &SignupAttributes,
    ) -> Result<String, IdentityError> {
        let mut form = vec![
            ("username", attributes.username.as_str()),
            ("first_name", attributes.first_name.as_str()),
            ("last_name", attributes.last_name.as_str()),
            ("email_address", attributes.email_address.as_str()),
        ];
        if !attributes.password.is_empty() {
            form.push(("password", attributes.password.as_str()));
        }

        let signup = self.post_signup("/v1/client/sign_ups", &form).await?;
        tracing::info!(signup_id = %signup.id, "Created pending signup");

        let prepare = format!(
            "/v1/client/sign_ups/{}/prepare_verification",
            urlencoding::encode(&signup.id)
        );
        self.post_signup(&prepare, &[("strategy", EMAIL_CODE_STRATEGY)])
            .await?;

        Ok(signup.id)
    }

    async fn verify_code(
        &self,
        pending_signup_id: &str,
        code: &str,
    ) -> Result<VerificationOutcome, IdentityError> {
        let path = format!(
            "/v1/client/sign_ups/{}/attempt_verification",
            urlencoding::encode(pending_signup_id)
        );
        let signup = self
            .post_signup(&path, &[("strategy", EMAIL_CODE_STRATEGY), ("code", code)])
            .await?;

        let status = match signup.status.as_deref() {
            Some("complete") => VerificationStatus::Complete,
            _ => VerificationStatus::Failed,
        };
        Ok(VerificationOutcome {
            status,
            created_identity_id: signup.created_user_id,
            created_session_id: signup.created_session_id,
        })
    }

    async fn establish_session(&self, session_id: &str) -> Result<(), IdentityError> {
        let path = format!("/v1/client/sessions/{}/touch", urlencoding::encode(session_id));
        let response = self.post_form(&path, &[]).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }

        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session_id.to_string());
        tracing::info!(session_id = %session_id, "Session established");
        Ok(())
    }
}
