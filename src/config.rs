//! Agent configuration.
//!
//! [`AgentConfig`] carries everything the agent needs to reach the dispatch
//! server and decide how to behave on errors. Defaults match a local server
//! on port 50051 with a 5 second retry delay.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dispatch_agent::AgentConfig;
//!
//! let config = AgentConfig::default()
//!     .with_host_port("dispatch.internal", 50051)
//!     .with_sleep_on_error(Duration::from_secs(10));
//! assert_eq!(config.port, 50051);
//! ```

use std::time::Duration;

use tracing::Level;

/// Default dispatch server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default dispatch server port.
pub const DEFAULT_PORT: u16 = 50051;

/// Default delay before retrying after a connection or registration error.
pub const DEFAULT_SLEEP_ON_ERROR: Duration = Duration::from_secs(5);

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Dispatch server host.
    pub host: String,
    /// Dispatch server port.
    pub port: u16,
    /// Log verbosity for the agent and its demos.
    pub log_level: Level,
    /// Delay before retrying after an error. Zero disables retry: the run
    /// loop terminates immediately, surfacing the error.
    pub sleep_on_error: Duration,
    /// Client version tag, sent with the dispatch session handshake.
    pub version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: Level::INFO,
            sleep_on_error: DEFAULT_SLEEP_ON_ERROR,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl AgentConfig {
    /// Set the dispatch server host and port.
    pub fn with_host_port(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the log verbosity.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Set the error retry delay. Zero makes errors fatal.
    pub fn with_sleep_on_error(mut self, delay: Duration) -> Self {
        self.sleep_on_error = delay;
        self
    }

    /// Override the client version tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Server address in `host:port` form.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
