//! # Market Telemetry
//!
//! Log output setup for Peer Market processes. Library crates only emit
//! `tracing` events; binaries and test harnesses call `init_logging` once.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config).expect("Failed to init logging");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PM_SERVICE_NAME` | `peer-market` | Service name in logs |
//! | `PM_LOG_LEVEL` | `info` | Log level filter |
//! | `PM_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `PM_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// The configuration could not be applied.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
