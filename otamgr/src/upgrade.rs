//! Sequencing of a full OTA upgrade once the image has been staged.
//!
//! The order is fixed:
//!
//! 1. resolve the image and header paths from the notified base path;
//! 2. persist the recovery marker naming the header destination;
//! 3. copy the header to its destination;
//! 4. flush logs;
//! 5. record [`RebootReason::FullOta`];
//! 6. hand the image to the upgrade tool, which replaces the running system.
//!
//! Only steps 1 and 2 abort the attempt. Once the marker exists the remaining
//! steps are best effort, since a half finished upgrade that still flashes is
//! preferable to one that stops with the marker already in place.

use std::{ffi::OsStr, process::ExitStatus, sync::Arc};

use tracing::{error, info, warn};

use crate::{
    marker::{MarkerError, RecoveryMarker},
    paths::{PathError, PathResolver},
    reboot_reason::{RebootReason, RebootReasonStore},
    shell::{exec_checked, ProcessError, Shell},
};

pub const COPY_PROGRAM: &str = "cp";
pub const LOG_FLUSH_PROGRAM: &str = "logpush";
pub const UPGRADE_PROGRAM: &str = "sysupgrade";

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("failed resolving upgrade paths")]
    Resolve(#[from] PathError),
    #[error("failed persisting recovery marker, upgrade aborted")]
    Marker(#[from] MarkerError),
    #[error("failed starting `{}`", UPGRADE_PROGRAM)]
    Upgrade(#[source] ProcessError),
}

#[derive(Debug)]
pub struct UpgradeExecutor {
    resolver: PathResolver,
    marker: RecoveryMarker,
    reboot_reason: RebootReasonStore,
    shell: Arc<dyn Shell>,
}

impl UpgradeExecutor {
    pub fn new(
        resolver: PathResolver,
        marker: RecoveryMarker,
        reboot_reason: RebootReasonStore,
        shell: Arc<dyn Shell>,
    ) -> Self {
        Self {
            resolver,
            marker,
            reboot_reason,
            shell,
        }
    }

    /// Runs an upgrade from the staged image at `base` (without extension).
    ///
    /// On a healthy device this never returns because the upgrade tool replaces
    /// the running system. If the tool does exit, its status is returned and
    /// the caller should treat it as a failed upgrade.
    #[tracing::instrument(skip_all, fields(base = %String::from_utf8_lossy(base)))]
    pub async fn run(&self, base: &[u8]) -> Result<ExitStatus, UpgradeError> {
        let paths = self.resolver.resolve(base)?;
        info!(
            image = %paths.image_src.display(),
            header = %paths.header_src.display(),
            header_dst = %paths.header_dst.display(),
            "resolved upgrade paths",
        );

        self.marker.persist(&paths.header_dst).await?;
        info!(marker = %self.marker.path().display(), "persisted recovery marker");

        if let Err(e) = exec_checked(
            &*self.shell,
            &[
                OsStr::new(COPY_PROGRAM),
                paths.header_src.as_os_str(),
                paths.header_dst.as_os_str(),
            ],
        )
        .await
        {
            warn!(error = ?e, "failed copying image header, continuing upgrade");
        }

        if let Err(e) =
            exec_checked(&*self.shell, &[OsStr::new(LOG_FLUSH_PROGRAM)]).await
        {
            warn!(error = ?e, "failed flushing logs, continuing upgrade");
        }

        if let Err(e) = self.reboot_reason.set(RebootReason::FullOta).await {
            error!(error = ?e, "failed recording reboot reason, continuing upgrade");
        }

        info!(image = %paths.image_src.display(), "starting system upgrade");
        let status = self
            .shell
            .exec(&[OsStr::new(UPGRADE_PROGRAM), paths.image_src.as_os_str()])
            .await
            .map_err(UpgradeError::Upgrade)?;

        error!(%status, "`{UPGRADE_PROGRAM}` returned; the running image was not replaced");
        Ok(status)
    }
}
