#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use devpub_core::{DeviceEvent, DeviceName};
use devpub_daemon::drvctl::decode_event;
use devpub_daemon::seqpacket::SeqPacket;
use devpub_daemon::{
    ChildListing, Daemon, DaemonConfig, DaemonError, DeviceTree, EventSource, EventSubscriber,
    StopHandle,
};
use tempfile::TempDir;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Fake kernel
// ---------------------------------------------------------------------------

/// Kernel side of the fake event source. Dropping it makes the source fail.
pub struct FakeKernel {
    tx: SeqPacket,
}

impl FakeKernel {
    /// Queue one event the way drvctl hands it out: an XML property list.
    pub fn emit(&self, event: &DeviceEvent) {
        let mut xml = Vec::new();
        plist::to_writer_xml(&mut xml, event).expect("serialize event plist");
        xml.push(0);
        self.tx.send_record(&xml).expect("queue kernel event");
    }
}

pub struct FakeSource {
    rx: SeqPacket,
}

impl EventSource for FakeSource {
    fn next_event(&mut self) -> io::Result<DeviceEvent> {
        let mut buf = [0u8; 4096];
        let read = self.rx.recv(&mut buf)?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "kernel went away"));
        }
        decode_event(&buf[..read]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl AsRawFd for FakeSource {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}

pub fn fake_kernel() -> (FakeKernel, FakeSource) {
    let (tx, rx) = SeqPacket::pair().expect("kernel pair");
    rx.set_nonblocking(true).expect("nonblocking source");
    (FakeKernel { tx }, FakeSource { rx })
}

/// Static device tree keyed by parent name ("" is the root).
#[derive(Default)]
pub struct FakeTree {
    pub children: HashMap<String, Vec<String>>,
}

impl FakeTree {
    pub fn with(mut self, node: &str, children: &[&str]) -> Self {
        self.children.insert(
            node.to_string(),
            children.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    fn names(&self, device: Option<&DeviceName>) -> Vec<String> {
        let key = device.map(DeviceName::as_str).unwrap_or_default();
        self.children.get(key).cloned().unwrap_or_default()
    }
}

impl DeviceTree for FakeTree {
    fn child_count(&mut self, device: Option<&DeviceName>) -> io::Result<usize> {
        Ok(self.names(device).len())
    }

    fn list_children(
        &mut self,
        device: Option<&DeviceName>,
        capacity: usize,
    ) -> io::Result<ChildListing> {
        let names = self.names(device);
        Ok(ChildListing {
            count: names.len(),
            names: names.into_iter().take(capacity).map(DeviceName::from).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hook script
// ---------------------------------------------------------------------------

/// Hook that appends its arguments, one run per line, to `log`.
pub fn recording_hook(dir: &Path, log: &Path) -> PathBuf {
    let path = dir.join("run-hooks");
    fs::write(
        &path,
        format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display()),
    )
    .expect("write hook");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod hook");
    path
}

pub fn hook_lines(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Running daemon
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub config: DaemonConfig,
    pub hook_log: PathBuf,
    pub kernel: FakeKernel,
    pub stop: StopHandle,
    pub task: JoinHandle<Result<(), DaemonError>>,
}

pub fn test_config(dir: &Path, hook_log: &Path, max_clients: usize) -> DaemonConfig {
    DaemonConfig {
        socket_path: dir.join("devpub.socket"),
        hook_path: recording_hook(dir, hook_log),
        syslog_path: dir.join("no-syslog"),
        max_clients,
        idle_timeout: Duration::from_millis(100),
        ..DaemonConfig::default()
    }
}

impl Harness {
    /// Spawn a reactor on the current runtime and wait for its socket.
    pub fn start(max_clients: usize) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let hook_log = dir.path().join("hook.log");
        let config = test_config(dir.path(), &hook_log, max_clients);
        let (kernel, source) = fake_kernel();
        let stop = StopHandle::new();

        let task = tokio::spawn(Daemon::new(config.clone(), source, stop.clone()).run());
        wait_for(|| config.socket_path.exists(), "listening socket");

        Self {
            dir,
            config,
            hook_log,
            kernel,
            stop,
            task,
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let subscriber =
            EventSubscriber::connect_retrying(&self.config.socket_path, 50, Duration::from_millis(20))
                .expect("subscribe");
        subscriber
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        subscriber
    }

    pub async fn shutdown(self) -> Result<(), DaemonError> {
        self.stop.request_stop();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("daemon stops in time")
            .expect("daemon task joins")
    }
}

/// Poll `cond` for up to five seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}
