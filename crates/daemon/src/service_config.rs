use std::path::PathBuf;
use std::time::Duration;

/// Resolved runtime configuration for the relay service
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the API HTTP server
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    /// How often expired sessions and envelopes are swept
    pub sweep_interval: Duration,
    /// Include server-side failure detail in error bodies
    pub expose_error_details: bool,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_port: 5000,
            sqlite_path: None,
            sweep_interval: Duration::from_secs(300),
            expose_error_details: false,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
