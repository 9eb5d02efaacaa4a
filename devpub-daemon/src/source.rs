//! Seams to the kernel device-control facility.

use std::io;
use std::os::fd::AsRawFd;

use devpub_core::{DeviceEvent, DeviceName};

/// Readable handle delivering attach/detach notifications.
///
/// The reactor waits for readability on [`AsRawFd::as_raw_fd`] and then
/// pulls one event. `next_event` must return `ErrorKind::WouldBlock` when
/// nothing is queued; any other error is fatal to the daemon.
///
/// `as_raw_fd` must keep returning the same open descriptor for the whole
/// lifetime of the value, since the reactor registers it once.
pub trait EventSource: AsRawFd {
    fn next_event(&mut self) -> io::Result<DeviceEvent>;
}

/// Result of one child-listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildListing {
    /// Child count the kernel reported while answering this query.
    pub count: usize,
    /// At most the requested capacity of names, in kernel order.
    pub names: Vec<DeviceName>,
}

/// Synchronous device-tree query. `None` names the root of the tree.
pub trait DeviceTree {
    fn child_count(&mut self, device: Option<&DeviceName>) -> io::Result<usize>;

    /// List up to `capacity` children. `count` may differ from `capacity`
    /// when the tree changed since the caller learned the count.
    fn list_children(
        &mut self,
        device: Option<&DeviceName>,
        capacity: usize,
    ) -> io::Result<ChildListing>;
}
