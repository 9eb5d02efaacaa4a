//! `/dev/drvctl` backend.
//!
//! `DRVLISTDEV` answers device-tree queries; `DRVGETEVENT` hands out one
//! event at a time as an externalized XML property list mapped into our
//! address space. Decoding is portable and lives in [`decode_event`]; the
//! ioctls only exist on NetBSD.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use devpub_core::{DeviceEvent, DeviceName};

use crate::error::DaemonError;
use crate::source::{ChildListing, DeviceTree, EventSource};

#[cfg(target_os = "netbsd")]
pub use netbsd::Drvctl;

/// Parse one kernel event dictionary (`event`, `device`, `parent`).
///
/// Trailing NUL padding is ignored, as are keys other than those three.
pub fn decode_event(bytes: &[u8]) -> Result<DeviceEvent, DaemonError> {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    Ok(plist::from_bytes(&bytes[..end])?)
}

/// Open the platform backend at `path`.
#[cfg(target_os = "netbsd")]
pub fn open(path: &Path) -> Result<Drvctl, DaemonError> {
    Drvctl::open(path)
}

/// Open the platform backend at `path`.
#[cfg(not(target_os = "netbsd"))]
pub fn open(path: &Path) -> Result<NoBackend, DaemonError> {
    tracing::error!(path = %path.display(), "no device control backend for this platform");
    Err(DaemonError::Unsupported)
}

/// Stand-in backend type on platforms without drvctl. Uninhabited.
#[derive(Debug)]
pub enum NoBackend {}

impl AsRawFd for NoBackend {
    fn as_raw_fd(&self) -> RawFd {
        match *self {}
    }
}

impl EventSource for NoBackend {
    fn next_event(&mut self) -> io::Result<DeviceEvent> {
        match *self {}
    }
}

impl DeviceTree for NoBackend {
    fn child_count(&mut self, _device: Option<&DeviceName>) -> io::Result<usize> {
        match *self {}
    }

    fn list_children(
        &mut self,
        _device: Option<&DeviceName>,
        _capacity: usize,
    ) -> io::Result<ChildListing> {
        match *self {}
    }
}

#[cfg(target_os = "netbsd")]
mod netbsd {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;
    use std::{ptr, slice};

    use devpub_core::{DeviceEvent, DeviceName};

    use super::decode_event;
    use crate::error::{io_err, DaemonError};
    use crate::source::{ChildListing, DeviceTree, EventSource};

    /// Kernel device-name width, terminator included.
    const DEVNAME_LEN: usize = 16;

    type RawName = [libc::c_char; DEVNAME_LEN];

    #[repr(C)]
    struct DevListArgs {
        l_devname: RawName,
        l_childname: *mut RawName,
        l_children: libc::size_t,
    }

    #[repr(C)]
    struct PlistRef {
        pref_plist: *mut libc::c_void,
        pref_len: libc::size_t,
    }

    nix::ioctl_readwrite!(drv_list_dev, b'D', 127, DevListArgs);
    nix::ioctl_read!(drv_get_event, b'D', 128, PlistRef);

    #[derive(Debug)]
    pub struct Drvctl {
        file: File,
    }

    impl Drvctl {
        /// Open read-write and non-blocking, so an empty event queue
        /// reports `EWOULDBLOCK` instead of sleeping in the kernel.
        pub fn open(path: &Path) -> Result<Self, DaemonError> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
                .map_err(|e| io_err(path, e))?;
            Ok(Self { file })
        }

        /// One `DRVLISTDEV` round trip. Returns the kernel's current count;
        /// at most `names.len()` names are written.
        fn list(&mut self, device: Option<&DeviceName>, names: &mut [RawName]) -> io::Result<usize> {
            let mut args = DevListArgs {
                l_devname: [0; DEVNAME_LEN],
                l_childname: if names.is_empty() {
                    ptr::null_mut()
                } else {
                    names.as_mut_ptr()
                },
                l_children: names.len(),
            };
            if let Some(device) = device {
                let bytes = device.as_str().as_bytes();
                let len = bytes.len().min(DEVNAME_LEN - 1);
                for (dst, src) in args.l_devname.iter_mut().zip(&bytes[..len]) {
                    *dst = *src as libc::c_char;
                }
            }
            // SAFETY: `args` points at `names.len()` writable slots.
            unsafe { drv_list_dev(self.file.as_raw_fd(), &mut args) }.map_err(io::Error::from)?;
            Ok(args.l_children)
        }
    }

    fn name_from_raw(raw: &RawName) -> DeviceName {
        let bytes: Vec<u8> = raw
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8)
            .collect();
        DeviceName(String::from_utf8_lossy(&bytes).into_owned())
    }

    impl DeviceTree for Drvctl {
        fn child_count(&mut self, device: Option<&DeviceName>) -> io::Result<usize> {
            self.list(device, &mut [])
        }

        fn list_children(
            &mut self,
            device: Option<&DeviceName>,
            capacity: usize,
        ) -> io::Result<ChildListing> {
            let mut raw = vec![[0 as libc::c_char; DEVNAME_LEN]; capacity];
            let count = self.list(device, &mut raw)?;
            let names = raw.iter().take(count.min(capacity)).map(name_from_raw).collect();
            Ok(ChildListing { count, names })
        }
    }

    impl EventSource for Drvctl {
        fn next_event(&mut self) -> io::Result<DeviceEvent> {
            let mut pref = PlistRef {
                pref_plist: ptr::null_mut(),
                pref_len: 0,
            };
            // SAFETY: the kernel fills `pref` with a fresh mapping.
            unsafe { drv_get_event(self.file.as_raw_fd(), &mut pref) }.map_err(io::Error::from)?;

            // SAFETY: the mapping is `pref_len` readable bytes until unmapped.
            let bytes = unsafe { slice::from_raw_parts(pref.pref_plist.cast::<u8>(), pref.pref_len) };
            let decoded = decode_event(bytes);
            // SAFETY: unmapping exactly what the kernel mapped for us.
            unsafe { libc::munmap(pref.pref_plist, pref.pref_len) };

            decoded.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
        }
    }

    impl AsRawFd for Drvctl {
        fn as_raw_fd(&self) -> RawFd {
            self.file.as_raw_fd()
        }
    }
}
