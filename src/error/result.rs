//! Result type alias for idmirror operations.

use super::context::ErrorContext;
use super::idmirror_error::IdMirrorError;

/// Type alias for Results using IdMirrorError.
pub type IdMirrorResult<T> = Result<T, IdMirrorError>;

/// Extension trait for Result types to add context to errors.
pub trait ResultExt<T> {
    /// Add context to an error if the result is Err.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use idmirror::error::{ErrorContext, ResultExt};
    ///
    /// let profile = service
    ///     .fetch(subject_id)
    ///     .await
    ///     .context(ErrorContext::new("fetch_profile").with_subject_id(subject_id))?;
    /// ```
    fn context(self, ctx: ErrorContext) -> IdMirrorResult<T>;

    /// Add context using a closure (only called on error).
    fn with_context<F>(self, f: F) -> IdMirrorResult<T>
    where
        F: FnOnce() -> ErrorContext;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<IdMirrorError>,
{
    fn context(self, ctx: ErrorContext) -> IdMirrorResult<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }

    fn with_context<F>(self, f: F) -> IdMirrorResult<T>
    where
        F: FnOnce() -> ErrorContext,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{HttpError, StoreError};

    #[test]
    fn test_context_extension() {
        let result: IdMirrorResult<i32> =
            Err(IdMirrorError::Http(HttpError::Timeout("5s".to_string())));

        let err = result
            .context(ErrorContext::new("check_username"))
            .unwrap_err();
        assert_eq!(err.context().unwrap().operation, "check_username");
    }

    #[test]
    fn test_context_extension_preserves_ok() {
        let result: IdMirrorResult<i32> = Ok(42);
        assert_eq!(result.context(ErrorContext::new("noop")).unwrap(), 42);
    }

    #[test]
    fn test_with_context_lazy_evaluation() {
        let result: Result<i32, StoreError> = Ok(42);
        let mut called = false;

        let with_ctx = result.with_context(|| {
            called = true;
            ErrorContext::new("test")
        });

        assert!(with_ctx.is_ok());
        assert!(!called);
    }

    #[test]
    fn test_context_from_collaborator_error() {
        let result: Result<(), StoreError> = Err(StoreError::NotFound {
            table: "users".to_string(),
        });

        let err = result
            .with_context(|| ErrorContext::new("fetch_profile").with_subject_id("user_1"))
            .unwrap_err();
        assert_eq!(err.error_code(), "STORE_NOT_FOUND");
        assert_eq!(
            err.context().unwrap().subject_id,
            Some("user_1".to_string())
        );
    }
}
