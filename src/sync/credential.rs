//! Short-lived bearer credentials minted by the identity provider.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// JWT claims we read without verifying the signature.
#[derive(Deserialize)]
struct JwtClaims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    sub: Option<String>,
}

fn decode_claims(token: &str) -> Option<JwtClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry of a JWT from its `exp` claim, if the token is a JWT.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(decode_claims(token)?.exp?, 0)
}

/// Subject of a JWT from its `sub` claim, if the token is a JWT.
pub fn jwt_subject(token: &str) -> Option<String> {
    decode_claims(token)?.sub
}

/// A bearer credential installed on the data store.
#[derive(Clone, PartialEq)]
pub struct SessionCredential {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
    /// Template the credential was minted for.
    pub template: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCredential {
    /// Wrap a freshly acquired token.
    pub fn new(token: impl Into<String>, template: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            expires_at: jwt_expiry(&token),
            token,
            acquired_at: Utc::now(),
            template: template.into(),
        }
    }

    /// True once the `exp` claim has passed. Opaque tokens never expire here.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Subject the credential was issued to.
    pub fn subject(&self) -> Option<String> {
        jwt_subject(&self.token)
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("acquired_at", &self.acquired_at)
            .field("template", &self.template)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
