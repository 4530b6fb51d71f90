use super::config::LogLevel;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitFailed(String),
}

// Noisy transport crates are capped at warn regardless of the chosen level.
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "reqwest=warn", "h2=warn", "tower=warn"];

/// Opt-in tracing initialization for hosts that have no subscriber of their
/// own. Embedders with an existing `tracing` setup should skip this.
pub fn init(level: LogLevel) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(filter_string(level))
        .map_err(|e| LoggingError::InitFailed(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init()
        .map_err(|e| LoggingError::InitFailed(e.to_string()))
}

pub fn filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(QUIET_DIRECTIVES.len() + 1);
    parts.push(level.as_str().to_string());
    for directive in QUIET_DIRECTIVES {
        parts.push((*directive).to_string());
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_string_includes_level_and_quiet_targets() {
        let filter = filter_string(LogLevel::Debug);
        assert!(filter.starts_with("debug"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn double_initialization_fails_cleanly() {
        let _ = init(LogLevel::Info);
        // A global subscriber now exists (ours or another test's); a second
        // attempt must report an error instead of panicking.
        assert!(init(LogLevel::Info).is_err());
    }
}
