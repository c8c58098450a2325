//! Device commands pushed through the device command attribute.

use std::{ffi::OsStr, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time};
use tracing::{debug, error, info, warn};

use crate::{
    reboot_reason::{RebootReason, RebootReasonStore},
    settings::GraceMode,
    shell::{exec_checked, Shell},
    upgrade::LOG_FLUSH_PROGRAM,
};

pub const COMMAND_PAYLOAD_LEN: usize = 4;

pub const SYNC_PROGRAM: &str = "sync";
pub const REBOOT_PROGRAM: &str = "reboot";
pub const KILL_PROGRAM: &str = "killall";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceCommand {
    Reboot = 0x01,
    ClearCredentials = 0x02,
    FactoryTest = 0x03,
}

impl DeviceCommand {
    /// Decodes the command byte. Unknown bytes yield `None`.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Reboot),
            0x02 => Some(Self::ClearCredentials),
            0x03 => Some(Self::FactoryTest),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("device command payload is {len} bytes, expected {}", COMMAND_PAYLOAD_LEN)]
pub struct PayloadMismatch {
    pub len: usize,
}

/// What became of a command payload.
#[derive(Debug)]
pub enum Handled {
    /// Empty payload or unknown command byte.
    Ignored,
    /// The command ran to completion inside the handler.
    Done(DeviceCommand),
    /// The command waits out its grace period on a separate task.
    Deferred(DeviceCommand, JoinHandle<()>),
}

#[derive(Clone, Debug)]
pub struct GraceConfig {
    pub mode: GraceMode,
    pub reboot: Duration,
    pub clear_credentials: Duration,
}

#[derive(Clone, Debug)]
pub struct CommandHandler {
    reboot_reason: RebootReasonStore,
    shell: Arc<dyn Shell>,
    grace: GraceConfig,
    credentials_process: String,
}

impl CommandHandler {
    pub fn new(
        reboot_reason: RebootReasonStore,
        shell: Arc<dyn Shell>,
        grace: GraceConfig,
        credentials_process: impl Into<String>,
    ) -> Self {
        Self {
            reboot_reason,
            shell,
            grace,
            credentials_process: credentials_process.into(),
        }
    }

    /// Interprets the first byte of `payload` as a [`DeviceCommand`].
    ///
    /// A payload of the wrong length is logged but still processed as long as
    /// it is not empty.
    #[tracing::instrument(skip_all, fields(len = payload.len()))]
    pub async fn handle(&self, payload: &[u8]) -> Handled {
        if payload.len() != COMMAND_PAYLOAD_LEN {
            let mismatch = PayloadMismatch { len: payload.len() };
            warn!(error = %mismatch, "processing anyway");
        }
        let Some(&byte) = payload.first() else {
            return Handled::Ignored;
        };
        let Some(command) = DeviceCommand::from_byte(byte) else {
            debug!(byte, "ignoring unknown device command");
            return Handled::Ignored;
        };
        info!(?command, "received device command");

        match command {
            DeviceCommand::FactoryTest => {
                debug!("factory test requested, nothing to do");
                Handled::Done(command)
            }
            DeviceCommand::Reboot | DeviceCommand::ClearCredentials => {
                match self.grace.mode {
                    GraceMode::Blocking => {
                        self.execute(command).await;
                        Handled::Done(command)
                    }
                    GraceMode::Deferred => {
                        let this = self.clone();
                        let task =
                            tokio::spawn(async move { this.execute(command).await });
                        Handled::Deferred(command, task)
                    }
                }
            }
        }
    }

    async fn execute(&self, command: DeviceCommand) {
        match command {
            DeviceCommand::Reboot => self.reboot().await,
            DeviceCommand::ClearCredentials => self.clear_credentials().await,
            DeviceCommand::FactoryTest => {}
        }
    }

    async fn reboot(&self) {
        debug!(grace = ?self.grace.reboot, "letting bus traffic drain before reboot");
        time::sleep(self.grace.reboot).await;

        if let Err(e) = self.reboot_reason.set(RebootReason::RebootCommand).await {
            error!(error = ?e, "failed recording reboot reason, rebooting anyway");
        }

        for program in [SYNC_PROGRAM, LOG_FLUSH_PROGRAM] {
            if let Err(e) = exec_checked(&*self.shell, &[OsStr::new(program)]).await {
                warn!(error = ?e, "continuing reboot");
            }
        }
        info!("rebooting");
        match self.shell.exec(&[OsStr::new(REBOOT_PROGRAM)]).await {
            Ok(status) => {
                error!(%status, "`{REBOOT_PROGRAM}` returned without rebooting");
            }
            Err(e) => error!(error = ?e, "failed to reboot"),
        }
    }

    async fn clear_credentials(&self) {
        debug!(
            grace = ?self.grace.clear_credentials,
            process = %self.credentials_process,
            "waiting for credentials to be erased",
        );
        time::sleep(self.grace.clear_credentials).await;

        info!(process = %self.credentials_process, "terminating credentials owner");
        if let Err(e) = exec_checked(
            &*self.shell,
            &[
                OsStr::new(KILL_PROGRAM),
                OsStr::new(&self.credentials_process),
            ],
        )
        .await
        {
            warn!(error = ?e, "failed terminating credentials owner");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_command_bytes() {
        assert_eq!(DeviceCommand::from_byte(0x01), Some(DeviceCommand::Reboot));
        assert_eq!(
            DeviceCommand::from_byte(0x02),
            Some(DeviceCommand::ClearCredentials)
        );
        assert_eq!(
            DeviceCommand::from_byte(0x03),
            Some(DeviceCommand::FactoryTest)
        );
        assert_eq!(DeviceCommand::from_byte(0x00), None);
        assert_eq!(DeviceCommand::from_byte(0x7f), None);
    }

    #[test]
    fn mismatch_message_names_both_lengths() {
        let msg = PayloadMismatch { len: 2 }.to_string();
        assert!(msg.contains('2') && msg.contains('4'), "{msg}");
    }
}
