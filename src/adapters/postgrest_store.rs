//! PostgREST-backed data store.
//!
//! Talks to a PostgREST endpoint (as exposed by Supabase under `/rest/v1`)
//! through an injectable [`HttpClient`]. Single-row reads use the
//! single-object media type so "no row" comes back as a distinguishable
//! error instead of an empty array.

use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::{DataStore, Filter, Headers, HttpClient, Response, Row, StoreError};

use super::ReqwestHttpClient;

/// Media type asking PostgREST for exactly one object.
pub const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST code for a single-object request that did not match exactly
/// one row. The `details` field tells zero rows apart from several.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Postgres `unique_violation`.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// PostgREST codes for a missing or expired JWT.
const JWT_ERROR_CODES: &[&str] = &["PGRST301", "PGRST302", "PGRST303"];

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Data store over PostgREST.
///
/// The API key is sent on every request. The bearer credential is whatever
/// was last installed with [`DataStore::set_authorization`].
pub struct PostgrestStore {
    base_url: String,
    api_key: String,
    http: Arc<dyn HttpClient>,
    authorization: RwLock<Option<String>>,
}

impl PostgrestStore {
    /// Create a store backed by [`ReqwestHttpClient`].
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_http_client(base_url, api_key, Arc::new(ReqwestHttpClient::new()))
    }

    /// Create a store on top of a custom HTTP client.
    pub fn with_http_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
            authorization: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bearer credential currently installed, if any.
    pub fn authorization(&self) -> Option<String> {
        self.authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn table_url(&self, table: &str, filter: Option<&Filter>) -> String {
        let mut url = format!("{}/rest/v1/{}", self.base_url, table);
        if let Some(filter) = filter {
            let query = filter
                .conditions()
                .iter()
                .map(|(column, value)| {
                    format!(
                        "{}=eq.{}",
                        urlencoding::encode(column),
                        urlencoding::encode(&filter_value(value))
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
        }
        url
    }

    /// Headers shared by every request.
    fn base_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("apikey".to_string(), self.api_key.clone());
        if let Some(token) = self.authorization() {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        headers
    }

    fn write_headers(&self, accept: &str) -> Headers {
        let mut headers = self.base_headers();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), accept.to_string());
        headers.insert("Prefer".to_string(), "return=representation".to_string());
        headers
    }
}

impl std::fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("base_url", &self.base_url)
            .field("authorized", &self.authorization().is_some())
            .finish()
    }
}

/// Filter values go on the wire as bare text.
fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Turn a non-2xx PostgREST response into a [`StoreError`].
fn classify_error(table: &str, response: &Response) -> StoreError {
    let body: PostgrestErrorBody = response.json().unwrap_or_default();
    let code = body.code;
    let no_rows = body
        .details
        .as_deref()
        .is_some_and(|details| details.contains("contains 0 rows"));
    let message = body
        .message
        .or(body.details)
        .or_else(|| response.text().ok().filter(|text| !text.is_empty()))
        .unwrap_or_else(|| format!("HTTP {}", response.status));

    match code.as_deref() {
        Some(NO_ROWS_CODE) if no_rows => StoreError::NotFound {
            table: table.to_string(),
        },
        Some(UNIQUE_VIOLATION_CODE) => StoreError::DuplicateKey {
            table: table.to_string(),
            message,
        },
        Some(code) if JWT_ERROR_CODES.contains(&code) => StoreError::Unauthorized(message),
        _ => match response.status {
            409 => StoreError::DuplicateKey {
                table: table.to_string(),
                message,
            },
            401 | 403 => StoreError::Unauthorized(message),
            status => StoreError::Api {
                status,
                code,
                message,
            },
        },
    }
}

/// Decode a single row, accepting either an object or a one-element array.
fn decode_row(table: &str, response: &Response) -> Result<Row, StoreError> {
    match response.json::<Value>() {
        Ok(Value::Object(row)) => Ok(row),
        Ok(Value::Array(rows)) => match rows.into_iter().next() {
            Some(Value::Object(row)) => Ok(row),
            _ => Err(StoreError::NotFound {
                table: table.to_string(),
            }),
        },
        Ok(other) => Err(StoreError::Decode(format!("expected a row, got {}", other))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

fn decode_rows(response: &Response) -> Result<Vec<Row>, StoreError> {
    if response.body.is_empty() {
        return Ok(Vec::new());
    }
    match response.json::<Value>() {
        Ok(Value::Array(rows)) => Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Ok(Value::Object(row)) => Ok(vec![row]),
        Ok(other) => Err(StoreError::Decode(format!("expected rows, got {}", other))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

fn encode_body(record: &Row) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl DataStore for PostgrestStore {
    fn set_authorization(&self, token: Option<&str>) {
        *self
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token.map(str::to_string);
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Row, StoreError> {
        let url = self.table_url(table, Some(filter));
        let mut headers = self.base_headers();
        headers.insert("Accept".to_string(), SINGLE_OBJECT.to_string());

        tracing::debug!(table = %table, "PostgREST select");
        let response = self.http.get(&url, &headers).await?;
        if !response.is_success() {
            return Err(classify_error(table, &response));
        }
        decode_row(table, &response)
    }

    async fn insert(&self, table: &str, record: Row) -> Result<Row, StoreError> {
        let url = self.table_url(table, None);
        let body = encode_body(&record)?;

        tracing::debug!(table = %table, "PostgREST insert");
        let response = self
            .http
            .post(&url, &body, &self.write_headers(SINGLE_OBJECT))
            .await?;
        if !response.is_success() {
            return Err(classify_error(table, &response));
        }
        // Some deployments ignore `Prefer` and answer 201 with no body.
        if response.body.is_empty() {
            return Ok(record);
        }
        decode_row(table, &response)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let url = self.table_url(table, Some(filter));
        let body = encode_body(&patch)?;

        tracing::debug!(table = %table, "PostgREST update");
        let response = self
            .http
            .patch(&url, &body, &self.write_headers("application/json"))
            .await?;
        if !response.is_success() {
            return Err(classify_error(table, &response));
        }
        decode_rows(&response)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        let url = self.table_url(table, Some(filter));

        tracing::debug!(table = %table, "PostgREST delete");
        let response = self.http.delete(&url, &self.base_headers()).await?;
        if !response.is_success() {
            return Err(classify_error(table, &response));
        }
        Ok(())
    }
}
