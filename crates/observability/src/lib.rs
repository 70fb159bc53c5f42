//! Process-wide tracing setup shared by the engine's binaries and tests.

/// Initialize process-wide tracing with the default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogSettings::from_env());
}

/// Subscriber configuration (filter, output format).
pub mod tracing;
