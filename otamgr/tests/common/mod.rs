#![allow(dead_code)]

use std::{
    collections::HashSet,
    ffi::OsStr,
    os::unix::process::ExitStatusExt as _,
    path::{Path, PathBuf},
    process::ExitStatus,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hub_otamgr::{
    attribute::{AttributeId, AttributeStatus},
    bus::{AttributeBus, BusError},
    settings::Settings,
    shell::{ProcessError, Shell},
};
use mockall::mock;
use tokio::time::Instant;

mock! {
    pub Bus {}

    #[async_trait]
    impl AttributeBus for Bus {
        async fn send_get_response(
            &self,
            status: AttributeStatus,
            get_id: u16,
            value: Vec<u8>,
        ) -> Result<(), BusError>;
        async fn issue_get(&self, id: AttributeId) -> Result<(), BusError>;
    }
}

/// One call into [`RecordingShell`].
#[derive(Clone, Debug)]
pub struct Invocation {
    pub at: Instant,
    pub cmd: Vec<String>,
    /// Contents of each watched file at the time of the call.
    pub snapshots: Vec<Option<String>>,
}

impl Invocation {
    pub fn program(&self) -> &str {
        &self.cmd[0]
    }
}

/// Records every command instead of running it. Programs listed in `failing`
/// exit with status 1, everything else succeeds.
#[derive(Clone, Debug, Default)]
pub struct RecordingShell {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    watched: Vec<PathBuf>,
}

impl RecordingShell {
    pub fn watching(paths: &[&Path]) -> Self {
        Self {
            watched: paths.iter().map(|p| p.to_path_buf()).collect(),
            ..Self::default()
        }
    }

    pub fn fail(&self, program: &str) {
        self.failing.lock().unwrap().insert(program.to_owned());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(|i| i.program().to_owned())
            .collect()
    }
}

#[async_trait]
impl Shell for RecordingShell {
    async fn exec(&self, cmd: &[&OsStr]) -> Result<ExitStatus, ProcessError> {
        let cmd: Vec<String> = cmd
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        let snapshots = self
            .watched
            .iter()
            .map(|p| std::fs::read_to_string(p).ok())
            .collect();
        let failed = self.failing.lock().unwrap().contains(&cmd[0]);
        self.invocations.lock().unwrap().push(Invocation {
            at: Instant::now(),
            cmd,
            snapshots,
        });

        // raw wait status; the exit code lives in the second byte
        Ok(ExitStatus::from_raw(if failed { 1 << 8 } else { 0 }))
    }
}

/// Settings that keep every file inside `dir` and use short grace periods.
pub fn settings(dir: &Path) -> Settings {
    Settings {
        recovery_marker: dir.join("otamgr.keep"),
        reboot_reason: dir.join("reboot_reason"),
        header_dst_dir: dir.join("etc"),
        reboot_grace: Duration::from_secs(5),
        clear_credentials_grace: Duration::from_secs(4),
        ..Settings::default()
    }
}
