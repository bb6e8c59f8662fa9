//! Unified error handling for idmirror.
//!
//! Collaborator errors ([`StoreError`](crate::traits::StoreError),
//! [`IdentityError`](crate::traits::IdentityError),
//! [`HttpError`](crate::traits::HttpError)) live next to their traits.
//! This module adds:
//!
//! - **Error Categories**: High-level classification for handling decisions
//! - **Synchronization Errors**: [`SyncError`] from the credential synchronizer
//! - **Unified Error Type**: [`IdMirrorError`] consolidates all error types
//! - **Error Context**: Debugging information attached to errors
//! - **Result Type Alias**: [`IdMirrorResult<T>`] for consistent return types
//!
//! # Error Categories
//!
//! | Category | Description | Retryable |
//! |----------|-------------|-----------|
//! | Network | Connection, DNS, timeout | Yes |
//! | Auth | Missing or rejected credentials | No |
//! | Server | Store or provider errors (5xx) | Yes |
//! | Client | Malformed responses | No |
//! | User | Invalid input, wrong code | No |
//! | Configuration | Missing endpoints or keys | No |

mod category;
mod context;
mod idmirror_error;
mod result;
mod sync;

pub use category::ErrorCategory;
pub use context::ErrorContext;
pub use idmirror_error::IdMirrorError;
pub use result::{IdMirrorResult, ResultExt};
pub use sync::SyncError;
