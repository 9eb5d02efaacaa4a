use std::time::Duration;

/// Device-control facility the kernel backend opens.
pub const DRVCTL_DEVICE: &str = "/dev/drvctl";

/// Well-known listening socket clients connect to.
pub const SOCKET_PATH: &str = "/var/run/ndevd.socket";

/// Hook program run once per event.
pub const HOOK_PATH: &str = "/libexec/devpubd-run-hooks";

/// Local syslog socket. Its existence is the reachability test.
pub const SYSLOG_PATH: &str = "/var/run/log";

/// Ident prefixed to every syslog and fallback line.
pub const LOG_IDENT: &str = "devpubd";

/// Upper bound on concurrently registered clients.
pub const MAX_CLIENTS: usize = 50;

/// Bounded reactor wait; also the listener recreation rate limit.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Records held while syslog is unreachable.
pub const LOG_BUFFER_CAPACITY: usize = 300;

/// Longest log message, terminator included.
pub const LOG_MSG_MAX: usize = 512;
