//! idmirror - username validation and identity-to-store credential sync
//!
//! This library exposes modules for use in integration tests.

pub mod adapters;
pub mod config;
pub mod error;
pub mod profile;
pub mod signup;
pub mod sync;
pub mod traits;
pub mod validation;
