//! Mock implementations for testing.
//!
//! This module provides mock implementations of all trait abstractions,
//! enabling unit testing without network access.
//!
//! # Available Mocks
//!
//! - [`InMemoryStore`] - Table store with constraints, latency and call log
//! - [`MockIdentityProvider`] - Scripted credentials and signup outcomes
//! - [`MockHttpClient`] - HTTP client with configurable responses

pub mod http;
pub mod identity;
pub mod store;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use identity::MockIdentityProvider;
pub use store::{InMemoryStore, RecordedCall, StoreOp};
