//! Output volume control
//!
//! Volume directives are handled on this machine rather than being
//! forwarded to the server, so the dispatcher needs a way to set the
//! system output level. The trait keeps the dispatcher testable on
//! machines without a mixer.

use std::process::Command;

use crate::error::{Error, Result};

/// Sets the output volume of the machine
pub trait VolumeControl {
    /// Set the output level as a percentage, 0 to 100
    ///
    /// # Errors
    ///
    /// Returns error if the level cannot be applied
    fn set_level(&mut self, level: u8) -> Result<()>;
}

/// Adjusts the operating system mixer through its own tooling
#[derive(Debug, Default)]
pub struct SystemVolume;

impl VolumeControl for SystemVolume {
    fn set_level(&mut self, level: u8) -> Result<()> {
        #[cfg(target_os = "macos")]
        let status = Command::new("osascript")
            .arg("-e")
            .arg(format!("set volume output volume {level}"))
            .status()?;

        #[cfg(not(target_os = "macos"))]
        let status = Command::new("amixer")
            .args(["-q", "sset", "Master"])
            .arg(format!("{level}%"))
            .status()?;

        if status.success() {
            tracing::debug!(level, "output volume set");
            Ok(())
        } else {
            Err(Error::Audio(format!(
                "volume command exited with {status}"
            )))
        }
    }
}
