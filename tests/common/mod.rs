//! Shared fixtures for integration tests.

#![allow(dead_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};

pub use idmirror::adapters::mock::{
    InMemoryStore, MockHttpClient, MockIdentityProvider, MockResponse, RecordedCall, StoreOp,
};

/// Unsigned JWT carrying `claims`.
pub fn make_jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.test_signature", header, payload)
}

/// JWT for `subject` expiring an hour from now.
pub fn jwt_for(subject: &str) -> String {
    make_jwt(json!({
        "sub": subject,
        "exp": chrono::Utc::now().timestamp() + 3600,
    }))
}

/// Store with a unique constraint on usernames and subject ids, as in production.
pub fn profile_store() -> InMemoryStore {
    InMemoryStore::new()
        .with_unique("users", "clerk_id")
        .with_unique("users", "username")
}
