pub mod config;
pub mod logging;

pub use config::{ConfigError, DispatchConfig, LogLevel};
pub use logging::LoggingError;
