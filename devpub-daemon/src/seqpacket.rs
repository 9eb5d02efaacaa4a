//! Local `SOCK_SEQPACKET` sockets.
//!
//! std and tokio only cover stream and datagram Unix sockets, so this module
//! talks to libc directly. Every descriptor is an [`OwnedFd`] and is closed
//! on drop. Sockets are created close-on-exec so the hook program never
//! inherits a client connection.

use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::time::Duration;

/// Flags for every record send: one complete message, and a vanished peer
/// must produce `EPIPE` rather than `SIGPIPE`.
const SEND_FLAGS: libc::c_int = libc::MSG_EOR | libc::MSG_NOSIGNAL;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

fn new_socket(flags: libc::c_int) -> io::Result<OwnedFd> {
    let fd = cvt(unsafe {
        libc::socket(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC | flags,
            0,
        )
    })?;
    // SAFETY: `socket` just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Build a `sockaddr_un` for `path`, returning it with its used length.
fn socket_addr(path: &Path) -> io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    // SAFETY: all-zero is a valid `sockaddr_un`.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path does not fit sun_path",
        ));
    }
    if bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket path contains a NUL byte",
        ));
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let base = ptr::addr_of!(addr) as usize;
    let path_offset = ptr::addr_of!(addr.sun_path) as usize - base;
    let len = path_offset + bytes.len() + 1;

    #[cfg(any(
        target_os = "netbsd",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly",
        target_os = "macos"
    ))]
    {
        addr.sun_len = len as u8;
    }

    Ok((addr, len as libc::socklen_t))
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Non-blocking listening socket bound to a filesystem path.
#[derive(Debug)]
pub struct SeqPacketListener {
    fd: OwnedFd,
}

impl SeqPacketListener {
    /// Bind and listen on `path`. The path must not exist.
    pub fn bind(path: &Path, backlog: usize) -> io::Result<Self> {
        let fd = new_socket(libc::SOCK_NONBLOCK)?;
        let (addr, len) = socket_addr(path)?;
        cvt(unsafe {
            libc::bind(
                fd.as_raw_fd(),
                ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                len,
            )
        })?;
        let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
        cvt(unsafe { libc::listen(fd.as_raw_fd(), backlog) })?;
        Ok(Self { fd })
    }

    /// Accept one pending connection. `WouldBlock` when none is queued.
    pub fn accept(&self) -> io::Result<SeqPacket> {
        let fd = cvt(unsafe {
            libc::accept4(
                self.fd.as_raw_fd(),
                ptr::null_mut(),
                ptr::null_mut(),
                libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            )
        })?;
        // SAFETY: `accept4` returned a fresh descriptor.
        Ok(SeqPacket {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }
}

impl AsRawFd for SeqPacketListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for SeqPacketListener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One connected SEQPACKET endpoint.
#[derive(Debug)]
pub struct SeqPacket {
    fd: OwnedFd,
}

impl SeqPacket {
    /// Blocking connect to the listener at `path`.
    pub fn connect(path: &Path) -> io::Result<Self> {
        let fd = new_socket(0)?;
        let (addr, len) = socket_addr(path)?;
        cvt(unsafe {
            libc::connect(
                fd.as_raw_fd(),
                ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                len,
            )
        })?;
        Ok(Self { fd })
    }

    /// Connected pair, both ends blocking.
    pub fn pair() -> io::Result<(Self, Self)> {
        let mut fds: [libc::c_int; 2] = [0; 2];
        cvt(unsafe {
            libc::socketpair(
                libc::AF_UNIX,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
                fds.as_mut_ptr(),
            )
        })?;
        // SAFETY: `socketpair` returned two fresh descriptors.
        let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok((Self { fd: a }, Self { fd: b }))
    }

    /// Send `record` as one message. Returns the byte count the kernel took.
    pub fn send_record(&self, record: &[u8]) -> io::Result<usize> {
        cvt_size(unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                record.as_ptr().cast::<libc::c_void>(),
                record.len(),
                SEND_FLAGS,
            )
        })
    }

    /// Receive one message. `Ok(0)` means the peer closed.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        cvt_size(unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        })
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        let fd = self.fd.as_raw_fd();
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
        Ok(())
    }

    /// `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = timeout.unwrap_or_default();
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        cvt(unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                ptr::addr_of!(tv).cast::<libc::c_void>(),
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        })?;
        Ok(())
    }
}

impl AsRawFd for SeqPacket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for SeqPacket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
