use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::DEFAULT_TIMEOUT;

/// Environment variable that overrides the per-call timeout, in whole seconds.
pub const CALL_TIMEOUT_ENV: &str = "RFNET_CALL_TIMEOUT_SECS";

/// Transport settings shared by [`RpcServer`](crate::RpcServer) and
/// [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub bind_address: String,

    pub call_timeout: Duration,

    pub connect_timeout: Duration,

    pub max_frame_length: usize,
}

impl RpcConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            call_timeout: DEFAULT_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
            max_frame_length: 1024 * 1024,
        }
    }

    /// Like [`RpcConfig::new`], then applies [`CALL_TIMEOUT_ENV`] when it holds
    /// a positive number of seconds.
    pub fn from_env(bind_address: impl Into<String>) -> Self {
        let config = Self::new(bind_address);
        match timeout_from_env(CALL_TIMEOUT_ENV) {
            Some(timeout) => config.with_call_timeout(timeout),
            None => config,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }
}

/// Parses an environment variable as a positive number of seconds.
pub fn timeout_from_env(key: &str) -> Option<Duration> {
    let raw = env::var(key).ok()?;
    parse_secs(&raw)
}

fn parse_secs(raw: &str) -> Option<Duration> {
    let value = raw.trim().parse::<u64>().ok()?;
    (value > 0).then(|| Duration::from_secs(value))
}

/// Limits and placement rules for the file service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of files that may be open at once.
    pub capacity: usize,

    pub max_path_len: usize,

    /// Upper bound on bytes moved by a single Read or Write.
    pub max_transfer: usize,

    /// When set, request paths are resolved beneath this directory.
    pub root: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            max_path_len: 1024,
            max_transfer: 4096,
            root: None,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }

    pub fn with_max_transfer(mut self, len: usize) -> Self {
        self.max_transfer = len;
        self
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = Some(root.into());
        self
    }
}
