use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use devpub_core::{DeviceEvent, RECORD_LEN};

use crate::error::{io_err, DaemonError};
use crate::seqpacket::SeqPacket;

/// Client side of the listening socket: one [`DeviceEvent`] per message.
#[derive(Debug)]
pub struct EventSubscriber {
    channel: SeqPacket,
    socket: PathBuf,
}

impl EventSubscriber {
    pub fn connect(socket: &Path) -> Result<Self, DaemonError> {
        if !socket.exists() {
            return Err(DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            });
        }

        let channel = SeqPacket::connect(socket).map_err(|err| {
            if matches!(
                err.kind(),
                ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
            ) {
                DaemonError::DaemonNotRunning {
                    socket: socket.to_path_buf(),
                }
            } else {
                io_err(socket, err)
            }
        })?;

        Ok(Self {
            channel,
            socket: socket.to_path_buf(),
        })
    }

    /// [`connect`](Self::connect), retrying while the daemon is not up yet.
    pub fn connect_retrying(socket: &Path, attempts: u32, delay: Duration) -> Result<Self, DaemonError> {
        let mut last_not_running: Option<DaemonError> = None;
        for attempt in 0..attempts {
            match Self::connect(socket) {
                Ok(subscriber) => return Ok(subscriber),
                Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                    last_not_running = Some(err);
                    if attempt + 1 < attempts {
                        sleep(delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_not_running.unwrap_or_else(|| DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        }))
    }

    /// Block for the next event. `Ok(None)` once the daemon closed the
    /// connection, which is also how a rejected connection looks.
    pub fn recv(&self) -> Result<Option<DeviceEvent>, DaemonError> {
        // Oversized messages are cut to the buffer; keep room to notice them.
        let mut buf = [0u8; RECORD_LEN * 2];
        let read = self
            .channel
            .recv(&mut buf)
            .map_err(|e| io_err(&self.socket, e))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(devpub_core::decode(&buf[..read])?))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), DaemonError> {
        self.channel
            .set_read_timeout(timeout)
            .map_err(|e| io_err(&self.socket, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqpacket::SeqPacketListener;
    use tempfile::TempDir;

    #[test]
    fn missing_socket_means_not_running() {
        let dir = TempDir::new().expect("tempdir");
        let err = EventSubscriber::connect(&dir.path().join("absent.socket")).unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning { .. }), "got: {err}");
    }

    #[test]
    fn receives_records_until_eof() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("devpub.socket");
        let listener = SeqPacketListener::bind(&path, 1).expect("bind");

        let subscriber = EventSubscriber::connect(&path).expect("connect");
        let server = listener.accept().expect("accept");
        let event = DeviceEvent::new("device-detach", "sd0", "umass0");
        server
            .send_record(&devpub_core::encode(&event).expect("encode"))
            .expect("send");
        drop(server);

        assert_eq!(subscriber.recv().expect("recv"), Some(event));
        assert_eq!(subscriber.recv().expect("recv eof"), None);
    }

    #[test]
    fn malformed_record_is_a_wire_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("devpub.socket");
        let listener = SeqPacketListener::bind(&path, 1).expect("bind");

        let subscriber = EventSubscriber::connect(&path).expect("connect");
        let server = listener.accept().expect("accept");
        server.send_record(b"short").expect("send");

        let err = subscriber.recv().unwrap_err();
        assert!(matches!(err, DaemonError::Wire(_)), "got: {err}");
    }
}
