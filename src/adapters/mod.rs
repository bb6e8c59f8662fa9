//! Concrete implementations of trait abstractions.
//!
//! Production adapters implement the traits defined in `crate::traits` on
//! top of an injectable [`HttpClient`](crate::traits::HttpClient).
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`PostgrestStore`] - Data store over a PostgREST endpoint
//! - [`FrontendApiIdentity`] - Identity provider over a frontend API
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles for all adapters:
//! - [`mock::InMemoryStore`] - In-memory tables with latency injection
//! - [`mock::MockIdentityProvider`] - Scripted credentials and signups
//! - [`mock::MockHttpClient`] - Configurable HTTP responses

pub mod frontend_api_identity;
pub mod mock;
pub mod postgrest_store;
pub mod reqwest_http;

pub use frontend_api_identity::FrontendApiIdentity;
pub use mock::{InMemoryStore, MockHttpClient, MockIdentityProvider};
pub use postgrest_store::PostgrestStore;
pub use reqwest_http::ReqwestHttpClient;
