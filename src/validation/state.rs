//! Validation verdict snapshots.

use crate::config::ValidationConfig;

use super::rules::InvalidReason;

/// Message attached to a `Valid` verdict.
pub const AVAILABLE_MESSAGE: &str = "Username is available";

/// Stage of a username check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPhase {
    /// Nothing to validate.
    #[default]
    Idle,
    /// Format passed; waiting for the debounce window or the lookup.
    Checking,
    Valid,
    Invalid,
}

/// Verdict for one candidate value.
///
/// Snapshots are replaced wholesale on every input change, never mutated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationState {
    /// Candidate the verdict belongs to (trimmed).
    pub input_value: String,
    pub phase: ValidationPhase,
    /// Reason text for `Invalid`, success note for `Valid`.
    pub message: Option<String>,
    /// Machine-readable reason for `Invalid`.
    pub reason: Option<InvalidReason>,
}

impl ValidationState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn checking(input: impl Into<String>) -> Self {
        Self {
            input_value: input.into(),
            phase: ValidationPhase::Checking,
            message: None,
            reason: None,
        }
    }

    pub fn valid(input: impl Into<String>) -> Self {
        Self {
            input_value: input.into(),
            phase: ValidationPhase::Valid,
            message: Some(AVAILABLE_MESSAGE.to_string()),
            reason: None,
        }
    }

    pub fn invalid(
        input: impl Into<String>,
        reason: InvalidReason,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            input_value: input.into(),
            phase: ValidationPhase::Invalid,
            message: Some(reason.message(config)),
            reason: Some(reason),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.phase == ValidationPhase::Valid
    }

    pub fn is_checking(&self) -> bool {
        self.phase == ValidationPhase::Checking
    }

    /// Whether no further transition is expected for this candidate.
    pub fn is_settled(&self) -> bool {
        !self.is_checking()
    }
}
