//! devpubd runtime: kernel device events in, hook runs and listener
//! notifications out.

pub mod clients;
pub mod config;
pub mod drvctl;
mod error;
pub mod hook;
pub mod listener;
pub mod logging;
pub mod paths;
pub mod probe;
pub mod protocol;
mod runtime;
pub mod seqpacket;
pub mod source;

pub use clients::{Admission, ClientRegistry};
pub use config::{DaemonConfig, RunOptions};
pub use error::DaemonError;
pub use hook::{HookInvoker, HookOutcome};
pub use listener::ChannelListener;
pub use probe::probe;
pub use protocol::EventSubscriber;
pub use runtime::{
    install_signal_handlers, serve, start_blocking, startup, Daemon, RunState, StopHandle,
};
pub use source::{ChildListing, DeviceTree, EventSource};
