//! Trait abstractions for the external collaborators.
//!
//! Every remote dependency is reached through one of these traits so that
//! the validation engine and the synchronizer can be driven by mocks in
//! tests and by HTTP adapters in production.
//!
//! # Traits
//!
//! - [`IdentityProvider`] - credentials, signup and sessions
//! - [`DataStore`] - row-level CRUD plus the shared authorization credential
//! - [`HttpClient`] - transport used by the production adapters

pub mod http;
pub mod identity;
pub mod store;

pub use http::{Headers, HttpClient, HttpError, Response};
pub use identity::{
    IdentityError, IdentityProvider, SignupAttributes, VerificationOutcome, VerificationStatus,
};
pub use store::{DataStore, Filter, Row, StoreError};
