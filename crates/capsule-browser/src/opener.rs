//! Handing non-capsule URLs to the operating system.

use std::process::Command;

use capsule_types::error::Result;

/// Opens URLs the browser itself cannot load (`https://`, `mailto:` ...).
pub trait ExternalOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Launches the platform's URL handler without waiting for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl SystemOpener {
    fn command(url: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl ExternalOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        log::info!("Opening {url} externally");
        Self::command(url).spawn()?;
        Ok(())
    }
}
