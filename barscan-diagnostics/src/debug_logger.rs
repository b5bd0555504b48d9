//! Structured logging setup

use barscan_core::{CaptureError, CaptureResult};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

/// Options for the global tracing subscriber
#[derive(Debug, Clone)]
pub struct DebugLogger {
    /// Directive used when `RUST_LOG` is unset or invalid
    pub default_filter: String,
    /// Print the module path of each event
    pub with_target: bool,
}

impl DebugLogger {
    /// Logger with the [`DEFAULT_FILTER`]
    pub fn new() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            with_target: false,
        }
    }

    /// Use `directive` when `RUST_LOG` is not set
    pub fn with_default_filter(mut self, directive: impl Into<String>) -> Self {
        self.default_filter = directive.into();
        self
    }

    /// Print module paths
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Build the filter: `RUST_LOG` first, then the default directive
    pub fn filter(&self) -> CaptureResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|e| {
                CaptureError::InvalidConfiguration {
                    message: format!("log filter '{}': {}", self.default_filter, e),
                }
            }),
        }
    }

    /// Install the global fmt subscriber
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> CaptureResult<()> {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter()?)
            .with_target(self.with_target)
            .try_init()
            .map_err(|e| CaptureError::Initialization {
                reason: format!("logging: {}", e),
            })
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global fmt subscriber with the default options
pub fn init_logging() -> CaptureResult<()> {
    DebugLogger::new().init()
}
