use std::{ffi::OsStr, fmt, io, process::ExitStatus};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("'cmd' arg cannot be empty")]
    EmptyCommand,
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Exit { program: String, status: ExitStatus },
}

/// Runs external programs from an argument vector. Nothing is ever passed
/// through a shell interpreter.
#[async_trait]
pub trait Shell: Send + Sync + fmt::Debug {
    /// Runs `cmd` to completion and returns how it exited.
    async fn exec(&self, cmd: &[&OsStr]) -> Result<ExitStatus, ProcessError>;
}

/// Like [`Shell::exec`], but a non-zero exit is an error.
pub async fn exec_checked(
    shell: &dyn Shell,
    cmd: &[&OsStr],
) -> Result<(), ProcessError> {
    let status = shell.exec(cmd).await?;
    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::Exit {
            program: program_name(cmd),
            status,
        })
    }
}

fn program_name(cmd: &[&OsStr]) -> String {
    cmd.first()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug)]
pub struct Host;

#[async_trait]
impl Shell for Host {
    async fn exec(&self, cmd: &[&OsStr]) -> Result<ExitStatus, ProcessError> {
        let (program, args) = cmd.split_first().ok_or(ProcessError::EmptyCommand)?;
        tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|source| ProcessError::Spawn {
                program: program_name(cmd),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_reports_exit_status() {
        exec_checked(&Host, &[OsStr::new("true")]).await.unwrap();

        let err = exec_checked(&Host, &[OsStr::new("false")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Exit { ref program, .. } if program == "false"));
    }

    #[tokio::test]
    async fn host_rejects_empty_command() {
        let err = Host.exec(&[]).await.unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = Host
            .exec(&[OsStr::new("/nonexistent/hub-otamgr-test-binary")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
