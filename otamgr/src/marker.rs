//! The recovery marker names the header file that the upgrade tool must carry
//! over when it replaces the root filesystem.

use std::{
    io,
    os::unix::ffi::OsStrExt as _,
    path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt as _};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("failed removing stale recovery marker `{}`", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed creating recovery marker `{}`", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed writing recovery marker `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct RecoveryMarker {
    path: PathBuf,
}

impl RecoveryMarker {
    const MODE: u32 = 0o600;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the marker with one that points at `header_dst`.
    ///
    /// The old marker is removed first, so on failure there is no marker rather
    /// than a stale one.
    pub async fn persist(&self, header_dst: &Path) -> Result<(), MarkerError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed previous recovery marker"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(MarkerError::Remove {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(Self::MODE)
            .open(&self.path)
            .await
            .map_err(|source| MarkerError::Create {
                path: self.path.clone(),
                source,
            })?;

        let write = async {
            file.write_all(header_dst.as_os_str().as_bytes()).await?;
            // tokio buffers writes; errors only surface on flush
            file.flush().await?;
            file.sync_all().await
        };
        if let Err(source) = write.await {
            drop(file);
            if let Err(e) = fs::remove_file(&self.path).await {
                warn!(
                    error = ?e,
                    path = %self.path.display(),
                    "failed removing partial recovery marker",
                );
            }
            return Err(MarkerError::Write {
                path: self.path.clone(),
                source,
            });
        }

        Ok(())
    }
}
