//! Live username validation.
//!
//! A local format pass gives instant feedback; well-formed candidates are
//! checked for availability against the profile table after a quiet
//! window. See [`UsernameValidator`].

mod engine;
mod rules;
mod state;
pub mod suggest;

pub use engine::{check_availability, UsernameValidator};
pub use rules::{check_format, validate_format, FormatCheck, InvalidReason};
pub use state::{ValidationPhase, ValidationState, AVAILABLE_MESSAGE};
pub use suggest::{available_alternatives, generate_random_username, suggest_alternatives};
