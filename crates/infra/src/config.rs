//! Engine configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PI_NUMBER_WIDTH` | `5` |
//! | `PI_MAX_PREFIX_LEN` | `7` |
//! | `PI_DEFAULT_PREFIX` | `SW` |
//! | `PI_ALLOC_MAX_ATTEMPTS` | `5` |
//! | `PI_ALLOC_BASE_DELAY_MS` | `5` |
//! | `PI_PERCENTAGE_MODE` | `sequential` |
//! | `DATABASE_URL` | unset (in-memory store) |
//!
//! Unparseable values are logged and replaced by the default.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use proforma_invoicing::{NumberFormat, PercentageMode};
use proforma_invoicing::number::{DEFAULT_MAX_PREFIX_LEN, DEFAULT_NUMBER_WIDTH};

use crate::retry::RetryPolicy;

pub const DEFAULT_PREFIX: &str = "SW";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub number_format: NumberFormat,
    pub default_prefix: String,
    pub retry: RetryPolicy,
    pub percentage_mode: PercentageMode,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            number_format: NumberFormat::default(),
            default_prefix: DEFAULT_PREFIX.to_string(),
            retry: RetryPolicy::default(),
            percentage_mode: PercentageMode::default(),
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let width = parsed(&lookup, "PI_NUMBER_WIDTH", DEFAULT_NUMBER_WIDTH);
        let max_prefix_len = parsed(&lookup, "PI_MAX_PREFIX_LEN", DEFAULT_MAX_PREFIX_LEN);
        let number_format = NumberFormat::new(width, max_prefix_len).unwrap_or_else(|e| {
            warn!(width, max_prefix_len, error = %e, "invalid number format, using default");
            NumberFormat::default()
        });

        let default_prefix = match lookup("PI_DEFAULT_PREFIX") {
            Some(raw) => match number_format.normalize_prefix(&raw) {
                Ok(prefix) => prefix.as_str().to_string(),
                Err(e) => {
                    warn!(value = %raw, error = %e, "invalid PI_DEFAULT_PREFIX, using default");
                    defaults.default_prefix
                }
            },
            None => defaults.default_prefix,
        };

        let retry = RetryPolicy {
            max_attempts: parsed(&lookup, "PI_ALLOC_MAX_ATTEMPTS", defaults.retry.max_attempts).max(1),
            base_delay: Duration::from_millis(parsed(
                &lookup,
                "PI_ALLOC_BASE_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
            ..defaults.retry
        };

        Self {
            number_format,
            default_prefix,
            retry,
            percentage_mode: parsed(&lookup, "PI_PERCENTAGE_MODE", defaults.percentage_mode),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(variable = name, value = %raw, error = %e, default = ?default, "invalid value, using default");
            default
        }),
        None => default,
    }
}
