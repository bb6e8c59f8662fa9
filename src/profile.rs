//! Profile rows mirrored from the identity provider.
//!
//! One row per identity-provider subject in the `users` table, keyed by the
//! `clerk_id` column. Creation is idempotent: an existing row is never
//! overwritten and a concurrent insert losing the unique-key race counts as
//! already present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::traits::{DataStore, Filter, Row, StoreError};

/// Table holding profile rows.
pub const PROFILE_TABLE: &str = "users";

/// Column holding the identity-provider subject id.
pub const SUBJECT_COLUMN: &str = "clerk_id";

/// The currently signed-in user as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

/// A row of the profile table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "clerk_id")]
    pub subject_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Set by the store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// A new row carrying what the identity provider knows.
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Serialize into a store row.
    pub fn to_row(&self) -> Result<Row, StoreError> {
        to_row(self)
    }

    /// Deserialize from a store row.
    pub fn from_row(row: Row) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Editable profile fields. `None` leaves a column untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of an idempotent profile creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSyncOutcome {
    /// This call inserted the row.
    Created,
    /// The row existed already, or a concurrent writer created it first.
    AlreadyPresent,
}

fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::Decode(format!("expected an object, got {}", other))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

/// Read and write access to profile rows.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DataStore>,
    table: String,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            table: PROFILE_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn subject_filter(subject_id: &str) -> Filter {
        Filter::eq(SUBJECT_COLUMN, subject_id)
    }

    /// The profile row for `subject_id`, if one exists.
    pub async fn fetch(&self, subject_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        match self
            .store
            .query(&self.table, &Self::subject_filter(subject_id))
            .await
        {
            Ok(row) => ProfileRecord::from_row(row).map(Some),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Insert `record` unless a row for its subject already exists.
    ///
    /// Never overwrites. A duplicate-key failure on insert means another
    /// writer won the race and is reported as [`ProfileSyncOutcome::AlreadyPresent`].
    pub async fn create_if_absent(
        &self,
        record: &ProfileRecord,
    ) -> Result<ProfileSyncOutcome, StoreError> {
        if self.fetch(&record.subject_id).await?.is_some() {
            return Ok(ProfileSyncOutcome::AlreadyPresent);
        }

        match self.store.insert(&self.table, record.to_row()?).await {
            Ok(_) => {
                tracing::info!(subject_id = %record.subject_id, "Created profile row");
                Ok(ProfileSyncOutcome::Created)
            }
            Err(StoreError::DuplicateKey { message, .. }) => {
                tracing::debug!(
                    subject_id = %record.subject_id,
                    detail = %message,
                    "Profile row created concurrently"
                );
                Ok(ProfileSyncOutcome::AlreadyPresent)
            }
            Err(err) => Err(err),
        }
    }

    /// Apply `update` to the row for `subject_id` and return the new row.
    ///
    /// Returns [`StoreError::NotFound`] when there is no such row.
    pub async fn update(
        &self,
        subject_id: &str,
        update: &ProfileUpdate,
    ) -> Result<ProfileRecord, StoreError> {
        if update.is_empty() {
            return self.fetch(subject_id).await?.ok_or_else(|| StoreError::NotFound {
                table: self.table.clone(),
            });
        }

        let rows = self
            .store
            .update(&self.table, &Self::subject_filter(subject_id), to_row(update)?)
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            table: self.table.clone(),
        })?;
        ProfileRecord::from_row(row)
    }
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("table", &self.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::InMemoryStore;
    use serde_json::json;

    fn service(store: &InMemoryStore) -> ProfileService {
        ProfileService::new(Arc::new(store.clone()))
    }

    #[test]
    fn test_record_serializes_subject_as_clerk_id() {
        let identity = Identity::new("user_1")
            .with_email("fox@example.com")
            .with_name("Fox", "Mulder");
        let row = ProfileRecord::from_identity(&identity).to_row().unwrap();

        assert_eq!(row.get("clerk_id"), Some(&json!("user_1")));
        assert_eq!(row.get("email"), Some(&json!("fox@example.com")));
        assert!(!row.contains_key("subject_id"));
        assert!(!row.contains_key("username"));
        assert!(!row.contains_key("created_at"));
    }

    #[test]
    fn test_record_from_row_parses_timestamp() {
        let row = json!({
            "clerk_id": "user_1",
            "username": "cool_fox42",
            "created_at": "2024-03-01T12:00:00+00:00",
            "id": 7
        });
        let record = ProfileRecord::from_row(row.as_object().cloned().unwrap()).unwrap();
        assert_eq!(record.username.as_deref(), Some("cool_fox42"));
        assert!(record.created_at.is_some());
        assert!(record.email.is_none());
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(service(&store).fetch("user_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_if_absent_never_overwrites() {
        let store = InMemoryStore::new();
        store.seed(
            "users",
            json!({ "clerk_id": "user_1", "email": "old@example.com", "username": "keep" }),
        );
        let record = ProfileRecord::from_identity(&Identity::new("user_1").with_email("new@example.com"));

        let outcome = service(&store).create_if_absent(&record).await.unwrap();
        assert_eq!(outcome, ProfileSyncOutcome::AlreadyPresent);
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.rows("users")[0].get("email"), Some(&json!("old@example.com")));
    }

    #[tokio::test]
    async fn test_create_if_absent_absorbs_duplicate_key() {
        let store = InMemoryStore::new();
        store.set_insert_error(Some(StoreError::DuplicateKey {
            table: "users".to_string(),
            message: "users_clerk_id_key".to_string(),
        }));
        let record = ProfileRecord::from_identity(&Identity::new("user_1"));

        let outcome = service(&store).create_if_absent(&record).await.unwrap();
        assert_eq!(outcome, ProfileSyncOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let store = InMemoryStore::new();
        store.seed(
            "users",
            json!({ "clerk_id": "user_1", "first_name": "Fox", "username": "old_name" }),
        );

        let updated = service(&store)
            .update(
                "user_1",
                &ProfileUpdate {
                    username: Some("new_name".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("new_name"));
        assert_eq!(updated.first_name.as_deref(), Some("Fox"));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let store = InMemoryStore::new();
        let err = service(&store)
            .update(
                "nobody",
                &ProfileUpdate {
                    username: Some("x_name".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
