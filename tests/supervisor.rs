//! Supervisor behavior with real child processes
//!
//! Children are small shell scripts that manipulate the shared status
//! file, standing in for the listener.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use hark::status::{Status, StatusLock};
use hark::supervisor::{RestartPolicy, Supervisor};

fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("child.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn supervisor(script: &Path, status_path: &Path, policy: RestartPolicy) -> Supervisor {
    let status = StatusLock::open(status_path).unwrap();
    Supervisor::new(script.to_path_buf(), Vec::new(), status, policy)
}

#[tokio::test]
async fn clean_exit_stops_supervision() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit 0");
    let status_path = dir.path().join("status");

    let mut sup = supervisor(
        &script,
        &status_path,
        RestartPolicy {
            restart_interval: Duration::from_secs(3600),
            max_start_failures: 3,
        },
    );

    sup.run().await.unwrap();
}

#[tokio::test]
async fn repeated_startup_failures_are_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let attempts = dir.path().join("attempts");
    let script = write_script(
        dir.path(),
        &format!("echo x >> {}\nexit 1", attempts.display()),
    );
    let status_path = dir.path().join("status");

    let mut sup = supervisor(
        &script,
        &status_path,
        RestartPolicy {
            restart_interval: Duration::from_secs(3600),
            max_start_failures: 3,
        },
    );

    assert!(sup.run().await.is_err());

    let attempts = std::fs::read_to_string(&attempts).unwrap();
    assert_eq!(attempts.lines().count(), 3);
}

#[tokio::test]
async fn scheduled_restart_waits_for_busy_child() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status");
    let marker = dir.path().join("respawned");

    // First run: go busy immediately, stay busy past the restart
    // deadline, then go idle and linger. Second run: exit cleanly so
    // the test ends.
    let script = write_script(
        dir.path(),
        &format!(
            "if [ -f {marker} ]; then exit 0; fi\n\
             touch {marker}\n\
             echo busy > {status}\n\
             sleep 1\n\
             echo idle > {status}\n\
             sleep 30",
            marker = marker.display(),
            status = status_path.display(),
        ),
    );

    let mut sup = supervisor(
        &script,
        &status_path,
        RestartPolicy {
            restart_interval: Duration::from_millis(200),
            max_start_failures: 3,
        },
    );

    let start = Instant::now();
    sup.run().await.unwrap();

    // The deadline elapsed at ~200ms but the child stayed busy for a
    // full second; termination must have waited it out.
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert!(marker.exists());
}

#[tokio::test]
async fn restart_request_replaces_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status");
    let marker = dir.path().join("respawned");

    let script = write_script(
        dir.path(),
        &format!(
            "if [ -f {marker} ]; then exit 0; fi\n\
             touch {marker}\n\
             echo restart > {status}\n\
             sleep 30",
            marker = marker.display(),
            status = status_path.display(),
        ),
    );

    let mut sup = supervisor(
        &script,
        &status_path,
        RestartPolicy {
            restart_interval: Duration::from_secs(3600),
            max_start_failures: 3,
        },
    );

    let run = tokio::time::timeout(Duration::from_secs(10), sup.run()).await;
    assert!(run.is_ok(), "supervisor did not replace the child in time");
    run.unwrap().unwrap();

    assert!(marker.exists());
    // The status file was reset for the replacement child.
    let status = StatusLock::open(&status_path).unwrap();
    assert_eq!(status.read().unwrap(), Status::Idle);
}

#[tokio::test]
async fn killed_child_counts_as_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let status_path = dir.path().join("status");

    // Dies to an external signal on every run.
    let script = write_script(dir.path(), "kill -KILL $$");

    let mut sup = supervisor(
        &script,
        &status_path,
        RestartPolicy {
            restart_interval: Duration::from_secs(3600),
            max_start_failures: 2,
        },
    );

    assert!(sup.run().await.is_err());
}
