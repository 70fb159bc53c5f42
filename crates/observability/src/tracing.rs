//! Tracing/logging initialization.
//!
//! Allocation attempts, store round-trips and invoice finalization emit spans
//! and events; this module decides where they go.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the fmt layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single-line output, for local runs.
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub default_directive: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogSettings {
    /// Read `PI_LOG_FORMAT` (`json` or `compact`); anything else keeps JSON.
    pub fn from_env() -> Self {
        let format = match std::env::var("PI_LOG_FORMAT").as_deref() {
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        };
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Build the filter: `RUST_LOG` wins, then the configured default.
pub fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.default_directive))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Initialize tracing/logging for the process.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(settings: &LogSettings) -> bool {
    let filter = env_filter(settings);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    match settings.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let settings = LogSettings::default();
        let _ = init(&settings);
        assert!(!init(&settings));
    }

    #[test]
    fn bad_default_directive_falls_back_to_info() {
        let settings = LogSettings {
            default_directive: "not a [valid directive".into(),
            format: LogFormat::Compact,
        };
        // Must not panic regardless of RUST_LOG.
        let _ = env_filter(&settings);
    }
}
