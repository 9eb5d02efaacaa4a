//! Detach from the controlling terminal.

use std::env;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::process;

use anyhow::{Context, Result};
use nix::unistd::{fork, setsid, ForkResult};

/// Fork into the background: the parent exits, the child starts a new
/// session in `/` with stdio on `/dev/null`.
///
/// Must run before any threads exist; the tokio runtime is built afterwards.
pub fn detach() -> Result<()> {
    // SAFETY: single-threaded at this point.
    match unsafe { fork() }.context("fork failed")? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;
    env::set_current_dir("/").context("chdir / failed")?;

    let null = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("open /dev/null failed")?;
    // SAFETY: 0, 1 and 2 are this process's stdio; `null` stays open for
    // the duration of the calls.
    unsafe {
        libc::dup2(null.as_raw_fd(), 0);
        libc::dup2(null.as_raw_fd(), 1);
        libc::dup2(null.as_raw_fd(), 2);
    }
    Ok(())
}
