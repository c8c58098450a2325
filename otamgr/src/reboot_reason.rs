use std::{
    ffi::OsString,
    fmt::{self, Display},
    io,
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt as _};

/// Why the device is about to restart. Read by the next boot stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootReason {
    FullOta,
    RebootCommand,
    FactoryReset,
}

impl RebootReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RebootReason::FullOta => "full_ota",
            RebootReason::RebootCommand => "reboot_command",
            RebootReason::FactoryReset => "factory_reset",
        }
    }
}

impl Display for RebootReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed writing reboot reason `{reason}` to `{}`", path.display())]
pub struct ReasonError {
    pub reason: RebootReason,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Clone, Debug)]
pub struct RebootReasonStore {
    path: PathBuf,
}

impl RebootReasonStore {
    const MODE: u32 = 0o440;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `reason`, replacing whatever was there.
    ///
    /// The file is read-only once written, so the new contents go to a sibling
    /// file that is renamed over the old one. On failure the previous reason is
    /// left in place.
    pub async fn set(&self, reason: RebootReason) -> Result<(), ReasonError> {
        let staging = self.staging_path();
        let result = match Self::write_staged(&staging, reason).await {
            Ok(()) => fs::rename(&staging, &self.path).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            // best effort, the staging file may not even exist
            fs::remove_file(&staging).await.ok();
        }

        result.map_err(|source| ReasonError {
            reason,
            path: self.path.clone(),
            source,
        })
    }

    async fn write_staged(staging: &Path, reason: RebootReason) -> io::Result<()> {
        match fs::remove_file(staging).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(Self::MODE)
            .open(staging)
            .await?;
        file.write_all(reason.as_str().as_bytes()).await?;
        // tokio buffers writes; errors only surface on flush
        file.flush().await?;
        file.sync_all().await
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(".new");
        self.path.with_file_name(name)
    }
}
