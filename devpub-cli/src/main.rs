//! devpubd: device event publication daemon.
//!
//! # Usage
//!
//! ```text
//! devpubd [-1fh]
//! ```

mod daemonize;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use devpub_daemon::paths::DRVCTL_DEVICE;
use devpub_daemon::{drvctl, start_blocking, DaemonConfig, RunOptions};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "devpubd",
    about = "Run hooks for device attach/detach events and publish them to local listeners",
    long_about = None,
)]
struct Cli {
    /// Stay attached to the terminal.
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Announce present devices, run the hook once, and exit. Implies -f.
    #[arg(short = '1', long)]
    once: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            foreground: self.foreground || self.once,
            once: self.once,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let options = Cli::parse().options();
    let config = DaemonConfig::default();

    let backend = drvctl::open(Path::new(DRVCTL_DEVICE))
        .with_context(|| format!("couldn't open {DRVCTL_DEVICE}"))?;

    if !options.foreground {
        daemonize::detach().context("couldn't fork")?;
    }

    start_blocking(config, options, backend).context("devpubd exited with error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_implies_foreground() {
        let cli = Cli::try_parse_from(["devpubd", "-1"]).expect("parse");
        let options = cli.options();
        assert!(options.once);
        assert!(options.foreground);
    }

    #[test]
    fn flags_combine() {
        let cli = Cli::try_parse_from(["devpubd", "-f1"]).expect("parse");
        assert!(cli.foreground && cli.once);
    }

    #[test]
    fn default_detaches_and_loops() {
        let options = Cli::try_parse_from(["devpubd"]).expect("parse").options();
        assert!(!options.foreground);
        assert!(!options.once);
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["devpubd", "wd0"]).is_err());
    }

    #[test]
    fn only_documented_flags_are_accepted() {
        for flag in ["-V", "--version"] {
            assert!(Cli::try_parse_from(["devpubd", flag]).is_err(), "{flag} accepted");
        }
    }
}
