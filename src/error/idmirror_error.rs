//! Unified error type for idmirror.
//!
//! `IdMirrorError` wraps the collaborator, synchronization and
//! configuration errors so callers outside the core (the CLI, a form) can
//! categorize, log and present any failure the same way.

use std::fmt;

use crate::config::ConfigError;
use crate::traits::{HttpError, IdentityError, StoreError};

use super::category::ErrorCategory;
use super::context::ErrorContext;
use super::sync::SyncError;

/// Unified error type.
#[derive(Debug)]
pub enum IdMirrorError {
    /// Data store errors.
    Store(StoreError),

    /// Identity provider errors.
    Identity(IdentityError),

    /// Transport errors outside of a collaborator call.
    Http(HttpError),

    /// Credential synchronization errors.
    Sync(SyncError),

    /// Missing or malformed configuration.
    Config(ConfigError),

    /// Wrapped error with additional context.
    WithContext {
        error: Box<IdMirrorError>,
        context: ErrorContext,
    },
}

fn http_category(err: &HttpError) -> ErrorCategory {
    match err {
        HttpError::ConnectionFailed(_) | HttpError::Timeout(_) => ErrorCategory::Network,
        HttpError::ServerError { status, .. } if *status == 401 || *status == 403 => {
            ErrorCategory::Auth
        }
        HttpError::ServerError { status, .. } if *status >= 500 => ErrorCategory::Server,
        HttpError::InvalidUrl(_) => ErrorCategory::Configuration,
        _ => ErrorCategory::Client,
    }
}

fn store_category(err: &StoreError) -> ErrorCategory {
    match err {
        StoreError::Unauthorized(_) => ErrorCategory::Auth,
        StoreError::Http(err) => http_category(err),
        StoreError::Api { status, .. } if *status >= 500 => ErrorCategory::Server,
        StoreError::DuplicateKey { .. } => ErrorCategory::User,
        _ => ErrorCategory::Client,
    }
}

fn identity_category(err: &IdentityError) -> ErrorCategory {
    match err {
        IdentityError::NotSignedIn => ErrorCategory::Auth,
        IdentityError::Rejected { .. } => ErrorCategory::User,
        IdentityError::Http(err) => http_category(err),
        IdentityError::Decode(_) | IdentityError::Other(_) => ErrorCategory::Client,
    }
}

impl IdMirrorError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IdMirrorError::Store(err) => store_category(err),
            IdMirrorError::Identity(err) => identity_category(err),
            IdMirrorError::Http(err) => http_category(err),
            IdMirrorError::Sync(err) => match err {
                SyncError::NotSignedIn => ErrorCategory::Auth,
                SyncError::Superseded => ErrorCategory::User,
                SyncError::Identity(err) => identity_category(err),
                SyncError::Store(err) => store_category(err),
            },
            IdMirrorError::Config(_) => ErrorCategory::Configuration,
            IdMirrorError::WithContext { error, .. } => error.category(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            IdMirrorError::Store(err) => err.is_transient(),
            IdMirrorError::Identity(err) => err.is_transient(),
            IdMirrorError::Http(err) => err.is_transient(),
            IdMirrorError::Sync(err) => err.is_retryable(),
            IdMirrorError::Config(_) => false,
            IdMirrorError::WithContext { error, .. } => error.is_retryable(),
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            IdMirrorError::Store(err) => SyncError::Store(err.clone()).user_message(),
            IdMirrorError::Identity(err) => err.user_message(),
            IdMirrorError::Http(_) => {
                "Unable to reach the server. Please check your connection.".to_string()
            }
            IdMirrorError::Sync(err) => err.user_message(),
            IdMirrorError::Config(err) => format!("Configuration error: {}", err),
            IdMirrorError::WithContext { error, .. } => error.user_message(),
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            IdMirrorError::Store(err) => match err {
                StoreError::NotFound { .. } => "STORE_NOT_FOUND",
                StoreError::DuplicateKey { .. } => "STORE_DUPLICATE_KEY",
                StoreError::Unauthorized(_) => "STORE_UNAUTHORIZED",
                StoreError::Api { .. } => "STORE_API",
                StoreError::Http(_) => "STORE_HTTP",
                StoreError::Decode(_) => "STORE_DECODE",
                StoreError::Other(_) => "STORE_ERROR",
            },
            IdMirrorError::Identity(err) => SyncError::Identity(err.clone()).error_code(),
            IdMirrorError::Http(err) => match err {
                HttpError::ConnectionFailed(_) => "HTTP_CONNECTION_FAILED",
                HttpError::Timeout(_) => "HTTP_TIMEOUT",
                HttpError::ServerError { .. } => "HTTP_SERVER_ERROR",
                HttpError::InvalidUrl(_) => "HTTP_INVALID_URL",
                HttpError::Other(_) => "HTTP_ERROR",
            },
            IdMirrorError::Sync(err) => err.error_code(),
            IdMirrorError::Config(ConfigError::MissingVar(_)) => "CONFIG_MISSING_VAR",
            IdMirrorError::Config(ConfigError::InvalidValue { .. }) => "CONFIG_INVALID_VALUE",
            IdMirrorError::WithContext { error, .. } => error.error_code(),
        }
    }

    /// Attach context to this error.
    pub fn with_context(self, ctx: ErrorContext) -> Self {
        IdMirrorError::WithContext {
            error: Box::new(self),
            context: ctx,
        }
    }

    /// Get the context if this error has one attached.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            IdMirrorError::WithContext { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the inner error without context.
    pub fn inner(&self) -> &IdMirrorError {
        match self {
            IdMirrorError::WithContext { error, .. } => error.inner(),
            _ => self,
        }
    }

    /// Get the recovery hint for this error.
    pub fn recovery_hint(&self) -> &'static str {
        self.category().recovery_hint()
    }

    /// Check if this error requires the identity to sign in again.
    pub fn requires_reauth(&self) -> bool {
        self.category() == ErrorCategory::Auth
    }
}

impl fmt::Display for IdMirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdMirrorError::Store(err) => write!(f, "{}", err),
            IdMirrorError::Identity(err) => write!(f, "{}", err),
            IdMirrorError::Http(err) => write!(f, "{}", err),
            IdMirrorError::Sync(err) => write!(f, "{}", err),
            IdMirrorError::Config(err) => write!(f, "{}", err),
            IdMirrorError::WithContext { error, context } => {
                write!(f, "{} ({})", error, context)
            }
        }
    }
}

impl std::error::Error for IdMirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IdMirrorError::Store(err) => Some(err),
            IdMirrorError::Identity(err) => Some(err),
            IdMirrorError::Http(err) => Some(err),
            IdMirrorError::Sync(err) => Some(err),
            IdMirrorError::Config(err) => Some(err),
            IdMirrorError::WithContext { error, .. } => error.source(),
        }
    }
}

impl From<StoreError> for IdMirrorError {
    fn from(err: StoreError) -> Self {
        IdMirrorError::Store(err)
    }
}

impl From<IdentityError> for IdMirrorError {
    fn from(err: IdentityError) -> Self {
        IdMirrorError::Identity(err)
    }
}

impl From<HttpError> for IdMirrorError {
    fn from(err: HttpError) -> Self {
        IdMirrorError::Http(err)
    }
}

impl From<SyncError> for IdMirrorError {
    fn from(err: SyncError) -> Self {
        IdMirrorError::Sync(err)
    }
}

impl From<ConfigError> for IdMirrorError {
    fn from(err: ConfigError) -> Self {
        IdMirrorError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_category() {
        let err: IdMirrorError = StoreError::Unauthorized("JWT expired".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert!(err.requires_reauth());

        let err: IdMirrorError = StoreError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Server);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_identity_rejection_is_user_actionable() {
        let err: IdMirrorError = IdentityError::Rejected {
            code: Some("form_code_incorrect".to_string()),
            message: "Incorrect code".to_string(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::User);
        assert_eq!(err.user_message(), "Incorrect code");
        assert_eq!(err.error_code(), "IDENTITY_REJECTED");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sync_error_category_follows_cause() {
        let err: IdMirrorError =
            SyncError::Identity(IdentityError::Http(HttpError::Timeout("5s".to_string()))).into();
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_config_error() {
        let err: IdMirrorError = ConfigError::MissingVar("IDMIRROR_STORE_URL").into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.error_code(), "CONFIG_MISSING_VAR");
        assert!(err.user_message().contains("IDMIRROR_STORE_URL"));
    }

    #[test]
    fn test_with_context_preserves_classification() {
        let err: IdMirrorError = HttpError::ConnectionFailed("refused".to_string()).into();
        let with_ctx = err.with_context(ErrorContext::new("check_username"));

        assert!(with_ctx.context().is_some());
        assert_eq!(with_ctx.category(), ErrorCategory::Network);
        assert_eq!(with_ctx.error_code(), "HTTP_CONNECTION_FAILED");
        assert!(matches!(with_ctx.inner(), IdMirrorError::Http(_)));
        assert!(with_ctx.to_string().contains("check_username"));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err: IdMirrorError = StoreError::Decode("bad json".to_string()).into();
        assert!(err.source().is_some());
    }
}
