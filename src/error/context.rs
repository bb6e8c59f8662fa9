//! Error context for enriched error information.

use chrono::{DateTime, Utc};

/// Context information attached to errors for debugging.
///
/// Records which operation failed and, when known, which identity it was
/// running for. The correlation id ties a log line to the store request
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    /// Human-readable description of the operation that failed.
    pub operation: String,

    /// Identity-provider subject id the operation ran for.
    pub subject_id: Option<String>,

    /// Timestamp when the error occurred.
    pub timestamp: DateTime<Utc>,

    /// Optional component/module where the error originated.
    pub component: Option<String>,

    /// Optional correlation ID for tracing across services.
    pub correlation_id: Option<String>,
}

impl ErrorContext {
    /// Create a new ErrorContext for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            subject_id: None,
            timestamp: Utc::now(),
            component: None,
            correlation_id: None,
        }
    }

    /// Set the subject id for this context.
    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Set the component for this context.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set the correlation ID for this context.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach a freshly generated correlation ID.
    pub fn with_new_correlation_id(self) -> Self {
        self.with_correlation_id(uuid::Uuid::new_v4().to_string())
    }

    /// Get a formatted context string suitable for logging.
    pub fn to_log_string(&self) -> String {
        let mut parts = vec![format!("operation={}", self.operation)];

        if let Some(ref subject_id) = self.subject_id {
            parts.push(format!("subject_id={}", subject_id));
        }

        if let Some(ref component) = self.component {
            parts.push(format!("component={}", component));
        }

        if let Some(ref correlation_id) = self.correlation_id {
            parts.push(format!("correlation_id={}", correlation_id));
        }

        parts.push(format!("timestamp={}", self.timestamp.to_rfc3339()));

        parts.join(" ")
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.operation)?;

        if let Some(ref subject_id) = self.subject_id {
            write!(f, " subject={}", subject_id)?;
        }

        Ok(())
    }
}
