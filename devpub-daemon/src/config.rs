//! Runtime configuration. There is no config file: defaults come from
//! [`crate::paths`] and callers override fields directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::paths::{
    HOOK_PATH, IDLE_TIMEOUT, LOG_BUFFER_CAPACITY, MAX_CLIENTS, SOCKET_PATH, SYSLOG_PATH,
};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub hook_path: PathBuf,
    pub syslog_path: PathBuf,
    pub max_clients: usize,
    pub idle_timeout: Duration,
    pub log_buffer_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_PATH),
            hook_path: PathBuf::from(HOOK_PATH),
            syslog_path: PathBuf::from(SYSLOG_PATH),
            max_clients: MAX_CLIENTS,
            idle_timeout: IDLE_TIMEOUT,
            log_buffer_capacity: LOG_BUFFER_CAPACITY,
        }
    }
}

/// Command-line switches carried into the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stay attached to the terminal.
    pub foreground: bool,
    /// Probe, dispatch the initial attach batch and exit.
    pub once: bool,
}
