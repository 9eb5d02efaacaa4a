use std::slice;
use std::sync::Arc;

use devpub_core::{DeviceEvent, DeviceName, ATTACH_EVENT};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::clients::ClientRegistry;
use crate::config::{DaemonConfig, RunOptions};
use crate::error::{io_err, DaemonError};
use crate::hook::HookInvoker;
use crate::listener::ChannelListener;
use crate::logging::init_tracing;
use crate::probe::probe;
use crate::source::{DeviceTree, EventSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    StopRequested,
}

/// Shared stop switch. Once stop is requested it stays requested.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<RunState>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn request_stop(&self) {
        self.tx.send_replace(RunState::StopRequested);
    }

    pub fn state(&self) -> RunState {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking<B>(
    config: DaemonConfig,
    options: RunOptions,
    backend: B,
) -> Result<(), DaemonError>
where
    B: EventSource + DeviceTree,
{
    init_tracing(&config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(serve(config, options, backend))
}

/// Announce present devices, then run the reactor unless `options.once`.
pub async fn serve<B>(config: DaemonConfig, options: RunOptions, mut backend: B) -> Result<(), DaemonError>
where
    B: EventSource + DeviceTree,
{
    let hook = HookInvoker::new(&config.hook_path);
    startup(&mut backend, &hook).await;
    if options.once {
        return Ok(());
    }

    let stop = StopHandle::new();
    let signals = match install_signal_handlers(stop.clone()) {
        Ok(signals) => signals,
        Err(err) => {
            tracing::error!(error = %err, "unable to install signal handlers");
            return Err(err);
        }
    };
    let result = Daemon::new(config, backend, stop).run().await;
    signals.abort();
    result
}

/// Probe the whole device tree and run the hook once for everything found.
pub async fn startup<T>(tree: &mut T, hook: &HookInvoker) -> Vec<DeviceName>
where
    T: DeviceTree + ?Sized,
{
    let devices = probe(tree, None);
    if devices.is_empty() {
        tracing::info!("no attached devices found");
        return devices;
    }
    tracing::info!(devices = devices.len(), "announcing attached devices");
    hook.dispatch(ATTACH_EVENT, &devices).await;
    devices
}

/// Map SIGTERM, SIGINT and SIGHUP onto `stop`.
pub fn install_signal_handlers(stop: StopHandle) -> Result<JoinHandle<()>, DaemonError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(|e| io_err("SIGINT handler", e))?;
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| io_err("SIGHUP handler", e))?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => "SIGHUP",
        };
        tracing::info!(signal = name, "received signal, shutting down");
        stop.request_stop();
    }))
}

/// Single-owner reactor over one kernel event source and the listener.
pub struct Daemon<S> {
    config: DaemonConfig,
    source: S,
    hook: HookInvoker,
    clients: ClientRegistry,
    stop: StopHandle,
}

impl<S: EventSource> Daemon<S> {
    pub fn new(config: DaemonConfig, source: S, stop: StopHandle) -> Self {
        Self {
            hook: HookInvoker::new(&config.hook_path),
            clients: ClientRegistry::new(config.max_clients),
            config,
            source,
            stop,
        }
    }

    /// Bind the listener and serve until stop is requested.
    ///
    /// Returns an error only for a failed initial bind or a broken event
    /// source, after logging it. Clients and the socket path are cleaned up
    /// either way once the listener exists.
    pub async fn run(self) -> Result<(), DaemonError> {
        let result = self.serve_until_stopped().await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "devpubd stopped on fatal error");
        }
        result
    }

    async fn serve_until_stopped(self) -> Result<(), DaemonError> {
        let Daemon {
            config,
            source,
            hook,
            mut clients,
            stop,
        } = self;

        let mut listener = ChannelListener::bind(
            &config.socket_path,
            config.max_clients,
            config.idle_timeout,
        )?;
        // SAFETY: `EventSource` requires `as_raw_fd` to name the same open
        // descriptor for as long as the source lives.
        let registered = unsafe { AsyncFd::register_with_interest(source, Interest::READABLE) };
        let mut source = match registered {
            Ok(source) => source,
            Err(err) => {
                listener.close();
                return Err(DaemonError::EventSource(err.into()));
            }
        };
        let mut state = stop.subscribe();
        tracing::info!(socket = %config.socket_path.display(), "devpubd running");

        let result = loop {
            if *state.borrow_and_update() == RunState::StopRequested {
                break Ok(());
            }
            listener.ensure_healthy(Instant::now());

            tokio::select! {
                biased;
                _ = state.changed() => {}
                accepted = listener.accept() => match accepted {
                    Ok(channel) => {
                        clients.admit(channel);
                    }
                    Err(err) => tracing::error!(error = %err, "accept failed"),
                },
                ready = source.readable_mut() => {
                    let event = match ready {
                        Ok(mut guard) => match guard.try_io(|inner| inner.get_mut().next_event()) {
                            Ok(Ok(event)) => event,
                            Ok(Err(err)) => break Err(DaemonError::EventSource(err)),
                            Err(_would_block) => continue,
                        },
                        Err(err) => break Err(DaemonError::EventSource(err)),
                    };
                    publish(&hook, &mut clients, &event).await;
                }
                _ = tokio::time::sleep(config.idle_timeout) => {}
            }
        };

        let closed = clients.close_all();
        listener.close();
        tracing::info!(clients = closed, "devpubd stopped");
        drop(stop);
        result
    }
}

/// Hook first, then clients, so the hook never learns of an event later
/// than a listener does.
async fn publish(hook: &HookInvoker, clients: &mut ClientRegistry, event: &DeviceEvent) {
    tracing::info!(
        event = %event.event,
        device = %event.device,
        parent = %event.parent,
        "device event"
    );
    hook.dispatch(&event.event, slice::from_ref(&event.device)).await;

    match devpub_core::encode(event) {
        Ok(record) => {
            let delivered = clients.broadcast(&record);
            tracing::debug!(clients = delivered, "event published");
        }
        Err(err) => tracing::error!(error = %err, "event not published"),
    }
}
