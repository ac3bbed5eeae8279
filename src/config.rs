//! Server configuration

use std::time::Duration;

use crate::error::AppError;

/// Default listening port
pub const DEFAULT_PORT: u16 = 4000;

/// Default idle threshold before a silent session is evicted
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default period of the idle reaper's scan
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Outbound queue capacity per session
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Runtime settings for `ChatServer`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `0.0.0.0:4000`
    pub bind_addr: String,
    /// Silence longer than this gets a session evicted
    pub idle_timeout: Duration,
    /// How often the reaper scans; independent of `idle_timeout`
    pub reap_interval: Duration,
    /// Messages a session may have queued before deliveries to it fail
    pub outbound_buffer: usize,
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    /// Reject settings the runtime cannot honor
    ///
    /// A zero reap interval would stop idle eviction and a zero buffer
    /// cannot back a queue.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.reap_interval.is_zero() {
            return Err(AppError::InvalidConfig("reap interval must be non-zero"));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::InvalidConfig("outbound buffer must be non-zero"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}
