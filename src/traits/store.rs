//! Data store trait abstraction.
//!
//! Row-level CRUD against a remote table store. The only shared mutable
//! state is the authorization credential installed with
//! [`DataStore::set_authorization`]; every later call carries whichever
//! token is installed at the moment the call is issued.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::http::HttpError;

/// A single row as a JSON object.
pub type Row = Map<String, Value>;

/// Equality filter over one or more columns.
///
/// All conditions must hold for a row to match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Filter rows where `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            conditions: vec![(column.into(), value.into())],
        }
    }

    /// Add another equality condition.
    pub fn and_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// The `(column, value)` pairs of this filter.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether `row` satisfies every condition.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// Data store errors.
///
/// `NotFound` and `DuplicateKey` are expected outcomes for lookups and
/// idempotent inserts respectively; callers match on them explicitly.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A single-row query matched no rows.
    #[error("No matching row in {table}")]
    NotFound { table: String },

    /// An insert violated a unique constraint.
    #[error("Duplicate key in {table}: {message}")]
    DuplicateKey { table: String, message: String },

    /// The installed credential was missing, expired or rejected.
    #[error("Store rejected authorization: {0}")]
    Unauthorized(String),

    /// The store answered with an error we do not classify further.
    #[error("Store error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Transport failure.
    #[error("Store request failed: {0}")]
    Http(#[from] HttpError),

    /// The response body could not be interpreted.
    #[error("Invalid store response: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// True for the "no row" outcome of a single-row query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for a unique-constraint violation on insert.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(err) => err.is_transient(),
            StoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Trait for the remote data store.
///
/// Implementations must use interior mutability for the authorization
/// credential so a shared `Arc<dyn DataStore>` can be re-authorized while
/// other components keep issuing calls.
///
/// # Example
///
/// ```ignore
/// use idmirror::traits::{DataStore, Filter, StoreError};
///
/// async fn is_taken<S: DataStore + ?Sized>(store: &S, name: &str) -> Result<bool, StoreError> {
///     match store.query("users", &Filter::eq("username", name)).await {
///         Ok(_) => Ok(true),
///         Err(StoreError::NotFound { .. }) => Ok(false),
///         Err(err) => Err(err),
///     }
/// }
/// ```
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Install (or clear) the bearer credential used by subsequent calls.
    fn set_authorization(&self, token: Option<&str>);

    /// Fetch exactly one row matching `filter`.
    ///
    /// Returns [`StoreError::NotFound`] when no row matches.
    async fn query(&self, table: &str, filter: &Filter) -> Result<Row, StoreError>;

    /// Insert `record` and return the stored row.
    ///
    /// Returns [`StoreError::DuplicateKey`] on a unique-constraint violation.
    async fn insert(&self, table: &str, record: Row) -> Result<Row, StoreError>;

    /// Apply `patch` to every row matching `filter`, returning the updated rows.
    async fn update(&self, table: &str, filter: &Filter, patch: Row)
        -> Result<Vec<Row>, StoreError>;

    /// Delete every row matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError>;
}
