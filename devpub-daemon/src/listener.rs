//! Lifecycle of the well-known listening socket.

use std::fs;
use std::future;
use std::io::{self, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{io_err, DaemonError};
use crate::seqpacket::{SeqPacket, SeqPacketListener};

/// Listening endpoint that recreates itself when its path is removed.
///
/// Recreation is attempted at most once per `retry_interval`; between
/// attempts a lost endpoint simply accepts nothing.
#[derive(Debug)]
pub struct ChannelListener {
    path: PathBuf,
    backlog: usize,
    socket: Option<AsyncFd<SeqPacketListener>>,
    retry_interval: Duration,
    last_attempt: Option<Instant>,
}

impl ChannelListener {
    /// Create the endpoint. Must be called inside a tokio runtime.
    pub fn bind(path: &Path, backlog: usize, retry_interval: Duration) -> Result<Self, DaemonError> {
        let socket = create_endpoint(path, backlog)?;
        Ok(Self {
            path: path.to_path_buf(),
            backlog,
            socket: Some(socket),
            retry_interval,
            last_attempt: None,
        })
    }

    pub fn is_listening(&self) -> bool {
        self.socket.is_some()
    }

    /// Check that the endpoint still exists on disk and rebuild it if not.
    pub fn ensure_healthy(&mut self, now: Instant) {
        if self.socket.is_some() && path_present(&self.path) {
            return;
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.retry_interval {
                return;
            }
        }
        self.last_attempt = Some(now);

        if self.socket.take().is_some() {
            warn!(socket = %self.path.display(), "listening socket path removed, recreating");
        }
        match create_endpoint(&self.path, self.backlog) {
            Ok(socket) => self.socket = Some(socket),
            Err(err) => error!(
                socket = %self.path.display(),
                error = %err,
                "unable to recreate listening socket"
            ),
        }
    }

    /// Wait for and accept one connection. Never resolves while the
    /// endpoint is down.
    pub async fn accept(&self) -> io::Result<SeqPacket> {
        let Some(socket) = self.socket.as_ref() else {
            return future::pending().await;
        };
        loop {
            let mut guard = socket.readable().await?;
            match guard.try_io(|inner| inner.get_ref().accept()) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Close the endpoint and remove its path.
    ///
    /// Connections still queued in the backlog are accepted and dropped
    /// first, so their peers read end-of-stream instead of a reset.
    pub fn close(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        let mut drained = 0usize;
        while let Ok(conn) = socket.get_ref().accept() {
            drop(conn);
            drained += 1;
        }
        if drained > 0 {
            debug!(socket = %self.path.display(), drained, "closed pending connections");
        }
        drop(socket);
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                socket = %self.path.display(),
                error = %err,
                "unable to remove listening socket"
            ),
        }
    }
}

fn path_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn create_endpoint(path: &Path, backlog: usize) -> Result<AsyncFd<SeqPacketListener>, DaemonError> {
    prepare_socket_for_bind(path)?;
    let listener = SeqPacketListener::bind(path, backlog).map_err(|e| io_err(path, e))?;
    set_socket_permissions(path)?;
    // SAFETY: the listener owns its descriptor and never replaces it, so
    // the registered fd stays open and unchanged for the AsyncFd's lifetime.
    let socket = unsafe { AsyncFd::register_with_interest(listener, Interest::READABLE) }
        .map_err(|e| io_err(path, io::Error::from(e)))?;
    info!(socket = %path.display(), "socket created");
    Ok(socket)
}

/// Refuse to steal a live endpoint; clear a stale one.
fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !path_present(socket) {
        return Ok(());
    }

    match SeqPacket::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::SocketInUse {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

/// World read/write so any local process may connect. Ownership moves to
/// root only when we run as root.
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } == 0 {
        std::os::unix::fs::chown(path, Some(0), Some(0)).map_err(|e| io_err(path, e))?;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(0o666)).map_err(|e| io_err(path, e))
}
