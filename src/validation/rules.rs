//! Synchronous username format rules.
//!
//! Runs before any remote lookup. Rules are checked in a fixed order and
//! the first failing rule decides the verdict.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ValidationConfig;

use super::state::ValidationState;

static USERNAME_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid username charset regex"));

/// Why a candidate username was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    TooShort,
    TooLong,
    DisallowedCharacters,
    StartsWithDigit,
    Reserved,
    /// A profile row already uses this username.
    AlreadyTaken,
    /// The availability lookup failed for a reason other than "no row".
    LookupFailed,
}

impl InvalidReason {
    /// Whether this verdict came from the local format pass.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, InvalidReason::AlreadyTaken | InvalidReason::LookupFailed)
    }

    /// Message shown under the username field.
    pub fn message(&self, config: &ValidationConfig) -> String {
        match self {
            InvalidReason::TooShort => {
                format!("Username must be at least {} characters", config.min_len)
            }
            InvalidReason::TooLong => {
                format!("Username must be no more than {} characters", config.max_len)
            }
            InvalidReason::DisallowedCharacters => {
                "Only letters, numbers, and underscores allowed".to_string()
            }
            InvalidReason::StartsWithDigit => "Username cannot start with a number".to_string(),
            InvalidReason::Reserved => "This username is reserved".to_string(),
            InvalidReason::AlreadyTaken => "Username is already taken".to_string(),
            InvalidReason::LookupFailed => "Error checking username availability".to_string(),
        }
    }
}

/// Outcome of the local format pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCheck {
    /// Nothing typed yet; not an error.
    Empty,
    Invalid(InvalidReason),
    /// Well-formed; availability still unknown.
    Passed,
}

/// Run the format rules against `value` in precedence order.
///
/// `value` is taken as-is; callers trim beforehand. Lengths count
/// characters, not bytes.
pub fn check_format(value: &str, config: &ValidationConfig) -> FormatCheck {
    if value.is_empty() {
        return FormatCheck::Empty;
    }

    let len = value.chars().count();
    if len < config.min_len {
        return FormatCheck::Invalid(InvalidReason::TooShort);
    }
    if len > config.max_len {
        return FormatCheck::Invalid(InvalidReason::TooLong);
    }
    if !USERNAME_CHARSET.is_match(value) {
        return FormatCheck::Invalid(InvalidReason::DisallowedCharacters);
    }
    if value.starts_with(|c: char| c.is_ascii_digit()) {
        return FormatCheck::Invalid(InvalidReason::StartsWithDigit);
    }
    if config.is_reserved(value) {
        return FormatCheck::Invalid(InvalidReason::Reserved);
    }

    FormatCheck::Passed
}

/// Verdict from the format rules alone.
///
/// A well-formed value comes back as `Checking`, since only the store can
/// say whether it is free.
pub fn validate_format(value: &str, config: &ValidationConfig) -> ValidationState {
    let candidate = value.trim();
    match check_format(candidate, config) {
        FormatCheck::Empty => ValidationState::idle(),
        FormatCheck::Invalid(reason) => ValidationState::invalid(candidate, reason, config),
        FormatCheck::Passed => ValidationState::checking(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(value: &str) -> FormatCheck {
        check_format(value, &ValidationConfig::default())
    }

    #[test]
    fn test_empty_is_not_an_error() {
        assert_eq!(check(""), FormatCheck::Empty);
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(check("ab"), FormatCheck::Invalid(InvalidReason::TooShort));
        assert_eq!(check("abc"), FormatCheck::Passed);
        assert_eq!(check(&"a".repeat(30)), FormatCheck::Passed);
        assert_eq!(
            check(&"a".repeat(31)),
            FormatCheck::Invalid(InvalidReason::TooLong)
        );
    }

    #[test]
    fn test_disallowed_characters() {
        for value in ["cool-fox", "cool fox", "fox!", "renée", "a.b.c"] {
            assert_eq!(
                check(value),
                FormatCheck::Invalid(InvalidReason::DisallowedCharacters),
                "{value}"
            );
        }
    }

    #[test]
    fn test_leading_digit() {
        assert_eq!(
            check("9abc"),
            FormatCheck::Invalid(InvalidReason::StartsWithDigit)
        );
        assert_eq!(check("abc9"), FormatCheck::Passed);
        assert_eq!(check("_9abc"), FormatCheck::Passed);
    }

    #[test]
    fn test_reserved_is_case_insensitive() {
        assert_eq!(check("admin"), FormatCheck::Invalid(InvalidReason::Reserved));
        assert_eq!(check("Admin"), FormatCheck::Invalid(InvalidReason::Reserved));
        assert_eq!(check("NULL"), FormatCheck::Invalid(InvalidReason::Reserved));
        assert_eq!(check("admin1"), FormatCheck::Passed);
    }

    #[test]
    fn test_precedence_first_failing_rule_wins() {
        // Short and disallowed: length is checked first.
        assert_eq!(check("a!"), FormatCheck::Invalid(InvalidReason::TooShort));
        // Leading digit and disallowed: charset is checked first.
        assert_eq!(
            check("9ab-c"),
            FormatCheck::Invalid(InvalidReason::DisallowedCharacters)
        );
        // Too long beats everything but empty and too short.
        assert_eq!(
            check(&format!("9{}", "!".repeat(40))),
            FormatCheck::Invalid(InvalidReason::TooLong)
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // Three characters, five bytes: fails the charset, not the length.
        assert_eq!(
            check("éé_"),
            FormatCheck::Invalid(InvalidReason::DisallowedCharacters)
        );
    }

    #[test]
    fn test_validate_format_trims_and_reports() {
        let config = ValidationConfig::default();
        assert_eq!(validate_format("  ", &config), ValidationState::idle());

        let state = validate_format(" root ", &config);
        assert_eq!(state.input_value, "root");
        assert_eq!(state.reason, Some(InvalidReason::Reserved));
        assert_eq!(state.message.as_deref(), Some("This username is reserved"));

        assert!(validate_format("cool_fox42", &config).is_checking());
    }

    #[test]
    fn test_messages_follow_config() {
        let config = ValidationConfig::default().with_length_bounds(4, 12);
        assert_eq!(
            InvalidReason::TooShort.message(&config),
            "Username must be at least 4 characters"
        );
        assert_eq!(
            InvalidReason::TooLong.message(&config),
            "Username must be no more than 12 characters"
        );
        assert!(InvalidReason::Reserved.is_format_error());
        assert!(!InvalidReason::AlreadyTaken.is_format_error());
    }
}
