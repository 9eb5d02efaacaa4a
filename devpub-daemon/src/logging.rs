//! Syslog bridge with pre-connection buffering.
//!
//! Every `tracing` event is rendered to one line and handed to a
//! [`LogBuffer`]. Until the syslog socket exists the buffer keeps up to
//! `capacity` records (later ones are dropped) and echoes each line to the
//! fallback writer. The first time the socket is found, the backlog is
//! replayed in arrival order and the buffer switches to pass-through for
//! the rest of the process lifetime.

use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;
use crate::paths::{LOG_IDENT, LOG_MSG_MAX};

/// `LOG_DAEMON` facility, already shifted into place.
const FACILITY_DAEMON: u8 = 3 << 3;

/// Syslog severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Err = 3,
    Warning = 4,
    Info = 6,
    Debug = 7,
}

impl Priority {
    pub fn from_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => Priority::Err,
            Level::WARN => Priority::Warning,
            Level::INFO => Priority::Info,
            _ => Priority::Debug,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub priority: Priority,
    pub message: String,
}

/// Destination that may not exist yet.
pub trait LogSink {
    fn is_reachable(&mut self) -> bool;
    fn emit(&mut self, record: &LogRecord);
}

// ---------------------------------------------------------------------------
// Syslog sink
// ---------------------------------------------------------------------------

/// RFC 3164 datagrams to the local syslog socket.
#[derive(Debug)]
pub struct SyslogSink {
    path: PathBuf,
    socket: Option<UnixDatagram>,
    pid: u32,
}

impl SyslogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            socket: None,
            pid: std::process::id(),
        }
    }
}

impl LogSink for SyslogSink {
    fn is_reachable(&mut self) -> bool {
        self.path.exists()
    }

    fn emit(&mut self, record: &LogRecord) {
        if self.socket.is_none() {
            self.socket = UnixDatagram::unbound().ok();
        }
        let Some(socket) = &self.socket else {
            return;
        };
        let line = format!(
            "<{}>{}[{}]: {}",
            FACILITY_DAEMON | record.priority.code(),
            LOG_IDENT,
            self.pid,
            record.message
        );
        // Best effort.
        let _ = socket.send_to(line.as_bytes(), &self.path);
    }
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

pub struct LogBuffer<K> {
    sink: K,
    fallback: Box<dyn Write + Send>,
    pending: VecDeque<LogRecord>,
    capacity: usize,
    reachable: bool,
}

impl<K: LogSink> LogBuffer<K> {
    /// Buffer in front of `sink`, echoing to stderr while it is unreachable.
    pub fn new(sink: K, capacity: usize) -> Self {
        Self::with_fallback(sink, capacity, Box::new(io::stderr()))
    }

    pub fn with_fallback(sink: K, capacity: usize, fallback: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            fallback,
            pending: VecDeque::new(),
            capacity,
            reachable: false,
        }
    }

    /// Never blocks on the sink and never fails.
    pub fn record(&mut self, priority: Priority, message: impl Into<String>) {
        let record = LogRecord {
            priority,
            message: clamp_message(message.into()),
        };

        if !self.reachable && self.sink.is_reachable() {
            self.reachable = true;
            for buffered in self.pending.drain(..) {
                self.sink.emit(&buffered);
            }
            self.pending = VecDeque::new();
        }

        if self.reachable {
            self.sink.emit(&record);
            return;
        }

        let _ = writeln!(self.fallback, "{LOG_IDENT}: {}", record.message);
        if self.pending.len() < self.capacity {
            self.pending.push_back(record);
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }
}

impl<K> fmt::Debug for LogBuffer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("pending", &self.pending.len())
            .field("capacity", &self.capacity)
            .field("reachable", &self.reachable)
            .finish()
    }
}

/// Cut `message` to `LOG_MSG_MAX - 1` bytes on a character boundary.
fn clamp_message(mut message: String) -> String {
    let max = LOG_MSG_MAX - 1;
    if message.len() > max {
        let mut end = max;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

// ---------------------------------------------------------------------------
// tracing layer
// ---------------------------------------------------------------------------

/// `tracing` layer feeding a [`LogBuffer`].
#[derive(Debug)]
pub struct LogBridge<K> {
    buffer: Mutex<LogBuffer<K>>,
}

impl<K: LogSink> LogBridge<K> {
    pub fn new(buffer: LogBuffer<K>) -> Self {
        Self {
            buffer: Mutex::new(buffer),
        }
    }
}

impl<S, K> Layer<S> for LogBridge<K>
where
    S: Subscriber,
    K: LogSink + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let priority = Priority::from_level(event.metadata().level());
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.record(priority, visitor.finish());
        }
    }
}

/// Renders `message` followed by ` key=value` for every other field.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`) in
/// front of the syslog bridge.
pub fn init_tracing(config: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let bridge = LogBridge::new(LogBuffer::new(
        SyslogSink::new(&config.syslog_path),
        config.log_buffer_capacity,
    ));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(bridge)
        .try_init();
}

/// In-memory capture of bridged log records for tests across the crate.
#[cfg(test)]
pub(crate) mod capture {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use tracing::Subscriber;
    use tracing_subscriber::layer::SubscriberExt;

    use super::{LogBridge, LogBuffer, LogRecord, LogSink};

    #[derive(Clone, Default)]
    pub(crate) struct MemorySink {
        reachable: Arc<AtomicBool>,
        emitted: Arc<Mutex<Vec<LogRecord>>>,
    }

    impl MemorySink {
        pub(crate) fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        pub(crate) fn records(&self) -> Vec<LogRecord> {
            self.emitted.lock().unwrap().clone()
        }

        pub(crate) fn messages(&self) -> Vec<String> {
            self.records().into_iter().map(|r| r.message).collect()
        }

        /// Records whose message starts with `prefix`.
        pub(crate) fn count_starting_with(&self, prefix: &str) -> usize {
            self.messages()
                .iter()
                .filter(|m| m.starts_with(prefix))
                .count()
        }
    }

    impl LogSink for MemorySink {
        fn is_reachable(&mut self) -> bool {
            self.reachable.load(Ordering::SeqCst)
        }

        fn emit(&mut self, record: &LogRecord) {
            self.emitted.lock().unwrap().push(record.clone());
        }
    }

    /// Subscriber routing every event through a [`LogBridge`] into the
    /// returned sink, which is reachable from the start.
    pub(crate) fn subscriber() -> (impl Subscriber + Send + Sync + 'static, MemorySink) {
        let sink = MemorySink::default();
        sink.set_reachable(true);
        let buffer = LogBuffer::with_fallback(sink.clone(), 16, Box::new(std::io::sink()));
        (tracing_subscriber::registry().with(LogBridge::new(buffer)), sink)
    }
}
