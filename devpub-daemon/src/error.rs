use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, kernel backend and subscriber API.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("wire record error: {0}")]
    Wire(#[from] devpub_core::WireError),

    #[error("kernel event decode error: {0}")]
    EventDecode(#[from] plist::Error),

    #[error("kernel event source failed: {0}")]
    EventSource(#[source] std::io::Error),

    #[error("listening socket already in use: {socket}")]
    SocketInUse { socket: PathBuf },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("device control backend is not supported on this platform")]
    Unsupported,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
