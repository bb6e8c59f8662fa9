//! Credential lifecycle for the signed-in identity.
//!
//! [`CredentialSynchronizer`] keeps the data store authorized with a fresh
//! credential from the identity provider and makes sure the identity's
//! profile row exists.

mod credential;
mod synchronizer;

pub use credential::{jwt_expiry, jwt_subject, SessionCredential};
pub use synchronizer::{CredentialSynchronizer, SyncPhase};
