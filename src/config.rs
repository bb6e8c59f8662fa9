//! Runtime configuration.
//!
//! All tunables of the validation engine and the synchronizer live here
//! with documented defaults. Use the builder methods to customize, or
//! [`AppConfig::from_env`] for the CLI.
//!
//! # Example
//!
//! ```ignore
//! use idmirror::config::{SyncConfig, ValidationConfig};
//! use std::time::Duration;
//!
//! let validation = ValidationConfig::default().with_debounce(Duration::from_millis(300));
//! let sync = SyncConfig::default().with_template("backend");
//! ```

use std::time::Duration;

use thiserror::Error;

/// Quiet window before a username availability lookup is issued.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Refresh cadence; must stay below the credential's validity window (60s).
pub const DEFAULT_REFRESH_SECS: u64 = 50;

/// Credential template requested from the identity provider.
pub const DEFAULT_TEMPLATE: &str = "supabase";

pub const DEFAULT_MIN_USERNAME_LEN: usize = 3;
pub const DEFAULT_MAX_USERNAME_LEN: usize = 30;

/// Usernames nobody may claim, compared case-insensitively.
pub const DEFAULT_RESERVED_USERNAMES: &[&str] = &[
    "admin",
    "administrator",
    "root",
    "system",
    "support",
    "help",
    "api",
    "null",
    "undefined",
];

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Tunables of the username validation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Quiet window before the remote lookup fires (default: 500ms)
    pub debounce: Duration,
    /// Minimum username length in characters (default: 3)
    pub min_len: usize,
    /// Maximum username length in characters (default: 30)
    pub max_len: usize,
    /// Reserved words, stored lowercase
    pub reserved: Vec<String>,
    /// Table holding profile rows (default: `users`)
    pub table: String,
    /// Column holding usernames (default: `username`)
    pub column: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            min_len: DEFAULT_MIN_USERNAME_LEN,
            max_len: DEFAULT_MAX_USERNAME_LEN,
            reserved: DEFAULT_RESERVED_USERNAMES
                .iter()
                .map(|word| word.to_string())
                .collect(),
            table: "users".to_string(),
            column: "username".to_string(),
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the inclusive length bounds.
    pub fn with_length_bounds(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    /// Replace the reserved word list.
    pub fn with_reserved<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reserved = words
            .into_iter()
            .map(|word| word.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Whether `value` is reserved (case-insensitive).
    pub fn is_reserved(&self, value: &str) -> bool {
        let lowered = value.to_lowercase();
        self.reserved.iter().any(|word| *word == lowered)
    }
}

/// Tunables of the credential synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Credential template (default: `supabase`)
    pub template: String,
    /// Refresh cadence (default: 50s)
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the refresh cadence.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }
}

/// Endpoints and keys for the production adapters, plus component tunables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the data store (PostgREST lives under `/rest/v1`)
    pub store_url: String,
    /// Public API key sent as `apikey` on every store call
    pub store_api_key: String,
    /// Base URL of the identity provider's frontend API
    pub identity_url: String,
    /// Active identity session, when one exists
    pub session_id: Option<String>,
    pub validation: ValidationConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Create a config for the given endpoints with default tunables.
    pub fn new(
        store_url: impl Into<String>,
        store_api_key: impl Into<String>,
        identity_url: impl Into<String>,
    ) -> Self {
        Self {
            store_url: store_url.into(),
            store_api_key: store_api_key.into(),
            identity_url: identity_url.into(),
            session_id: None,
            validation: ValidationConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Set the active identity session.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Build the config from `IDMIRROR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::MissingVar(name));

        let mut config = Self::new(
            required("IDMIRROR_STORE_URL")?,
            required("IDMIRROR_STORE_API_KEY")?,
            required("IDMIRROR_IDENTITY_URL")?,
        );

        if let Some(session_id) = lookup("IDMIRROR_SESSION_ID") {
            config = config.with_session_id(session_id);
        }
        if let Some(template) = lookup("IDMIRROR_TEMPLATE") {
            config.sync = config.sync.with_template(template);
        }
        if let Some(value) = lookup("IDMIRROR_REFRESH_SECS") {
            let secs = parse_positive("IDMIRROR_REFRESH_SECS", &value)?;
            config.sync = config.sync.with_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(value) = lookup("IDMIRROR_DEBOUNCE_MS") {
            let millis = parse_positive("IDMIRROR_DEBOUNCE_MS", &value)?;
            config.validation = config.validation.with_debounce(Duration::from_millis(millis));
        }

        Ok(config)
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
