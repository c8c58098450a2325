use std::{path::Path, sync::Arc};

use common::{settings, RecordingShell};
use hub_otamgr::{
    marker::RecoveryMarker,
    paths::{PathError, PathKind, PathResolver, MAX_PATH_LEN},
    reboot_reason::RebootReasonStore,
    upgrade::{
        UpgradeError, UpgradeExecutor, COPY_PROGRAM, LOG_FLUSH_PROGRAM, UPGRADE_PROGRAM,
    },
};

mod common;

fn executor(dir: &Path, shell: &RecordingShell) -> UpgradeExecutor {
    let settings = settings(dir);
    std::fs::create_dir_all(&settings.header_dst_dir).unwrap();
    UpgradeExecutor::new(
        PathResolver::new(&settings.header_dst_dir),
        RecoveryMarker::new(&settings.recovery_marker),
        RebootReasonStore::new(&settings.reboot_reason),
        Arc::new(shell.clone()),
    )
}

#[tokio::test]
async fn steps_run_in_order_and_reason_precedes_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::watching(&[
        &dir.path().join("otamgr.keep"),
        &dir.path().join("reboot_reason"),
    ]);

    let status = executor(dir.path(), &shell)
        .run(b"/tmp/ota/hub-2.0")
        .await
        .unwrap();

    // the recording shell pretends the upgrade tool came back
    assert!(status.success());
    let calls = shell.invocations();
    assert_eq!(shell.programs(), [COPY_PROGRAM, LOG_FLUSH_PROGRAM, UPGRADE_PROGRAM]);

    let header_dst = dir.path().join("etc").join("hub-2.0.hdr");
    assert_eq!(
        calls[0].cmd,
        [
            COPY_PROGRAM.to_owned(),
            "/tmp/ota/hub-2.0.hdr".to_owned(),
            header_dst.display().to_string(),
        ]
    );
    assert_eq!(calls[2].cmd[1], "/tmp/ota/hub-2.0.img");

    // marker exists before anything is invoked
    assert_eq!(calls[0].snapshots[0], Some(header_dst.display().to_string()));
    // reason is written after the log flush and before the upgrade
    assert_eq!(calls[1].snapshots[1], None);
    assert_eq!(calls[2].snapshots[1].as_deref(), Some("full_ota"));
}

#[tokio::test]
async fn too_long_path_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::default();
    let base = vec![b'a'; MAX_PATH_LEN - 4];

    let err = executor(dir.path(), &shell).run(&base).await.unwrap_err();

    assert!(matches!(
        err,
        UpgradeError::Resolve(PathError::TooLong {
            which: PathKind::ImageSrc,
            ..
        })
    ));
    assert!(shell.invocations().is_empty());
    assert!(!dir.path().join("otamgr.keep").exists());
    assert!(!dir.path().join("reboot_reason").exists());
}

#[tokio::test]
async fn marker_failure_aborts_before_copy() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::default();
    let settings = settings(dir.path());
    let executor = UpgradeExecutor::new(
        PathResolver::new(&settings.header_dst_dir),
        RecoveryMarker::new(dir.path().join("missing").join("otamgr.keep")),
        RebootReasonStore::new(&settings.reboot_reason),
        Arc::new(shell.clone()),
    );

    let err = executor.run(b"/tmp/hub").await.unwrap_err();

    assert!(matches!(err, UpgradeError::Marker(_)), "{err:?}");
    assert!(shell.invocations().is_empty());
    assert!(!dir.path().join("reboot_reason").exists());
}

#[tokio::test]
async fn failed_copy_and_flush_do_not_stop_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::default();
    shell.fail(COPY_PROGRAM);
    shell.fail(LOG_FLUSH_PROGRAM);

    executor(dir.path(), &shell).run(b"/tmp/hub").await.unwrap();

    assert_eq!(shell.programs(), [COPY_PROGRAM, LOG_FLUSH_PROGRAM, UPGRADE_PROGRAM]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("reboot_reason")).unwrap(),
        "full_ota"
    );
}

#[tokio::test]
async fn unwritable_reason_does_not_stop_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::default();
    let settings = settings(dir.path());
    let executor = UpgradeExecutor::new(
        PathResolver::new(dir.path()),
        RecoveryMarker::new(&settings.recovery_marker),
        RebootReasonStore::new(dir.path().join("missing").join("reboot_reason")),
        Arc::new(shell.clone()),
    );

    executor.run(b"/tmp/hub").await.unwrap();

    assert_eq!(shell.programs().last().map(String::as_str), Some(UPGRADE_PROGRAM));
}

#[tokio::test]
async fn repeated_upgrades_leave_one_marker_for_latest() {
    let dir = tempfile::tempdir().unwrap();
    let shell = RecordingShell::default();
    let executor = executor(dir.path(), &shell);

    executor.run(b"/tmp/first").await.unwrap();
    executor.run(b"/tmp/second").await.unwrap();

    let marker = std::fs::read_to_string(dir.path().join("otamgr.keep")).unwrap();
    assert!(marker.ends_with("second.hdr"), "{marker}");
    let keep_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".keep")
        })
        .count();
    assert_eq!(keep_files, 1);
}
