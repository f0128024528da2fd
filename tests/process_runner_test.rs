#![cfg(unix)]

use small_elt::domain::model::CommandSpec;
use small_elt::domain::ports::CommandRunner;
use small_elt::{EltError, ProcessRunner};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_captures_output_and_exit_code_without_check() {
    let command = CommandSpec::new("sh")
        .args(["-c", "printf '%s' \"$PGPASSWORD\"; printf 'oops' >&2; exit 3"])
        .env("PGPASSWORD", "from-overlay");

    let output = assert_ok!(ProcessRunner::new().run(&command, false).await);

    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout, "from-overlay");
    assert_eq!(output.stderr, "oops");
    assert!(!output.success());
}

#[tokio::test]
async fn test_check_turns_nonzero_exit_into_process_failure() {
    let command = CommandSpec::new("sh").args(["-c", "echo 'relation does not exist' >&2; exit 2"]);

    let err = assert_err!(ProcessRunner::new().run(&command, true).await);
    match err {
        EltError::ProcessFailure {
            program,
            exit_code,
            stderr,
        } => {
            assert_eq!(program, "sh");
            assert_eq!(exit_code, 2);
            assert_eq!(stderr, "relation does not exist\n");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_overlay_wins_and_ambient_env_is_inherited() {
    std::env::set_var("SMALL_ELT_AMBIENT_ONLY", "ambient");
    std::env::set_var("SMALL_ELT_SHARED_KEY", "ambient");

    let command = CommandSpec::new("sh")
        .args([
            "-c",
            "printf '%s,%s' \"$SMALL_ELT_AMBIENT_ONLY\" \"$SMALL_ELT_SHARED_KEY\"",
        ])
        .env("SMALL_ELT_SHARED_KEY", "overlay");

    let output = assert_ok!(ProcessRunner::new().run(&command, true).await);
    assert_eq!(output.stdout, "ambient,overlay");

    // the overlay never leaks into our own environment
    assert_eq!(std::env::var("SMALL_ELT_SHARED_KEY").unwrap(), "ambient");

    std::env::remove_var("SMALL_ELT_AMBIENT_ONLY");
    std::env::remove_var("SMALL_ELT_SHARED_KEY");
}

#[tokio::test]
async fn test_arguments_are_not_shell_interpreted() {
    let command = CommandSpec::new("printf").args(["%s", "db; echo injected $(whoami)"]);

    let output = assert_ok!(ProcessRunner::new().run(&command, true).await);
    assert_eq!(output.stdout, "db; echo injected $(whoami)");
}

#[tokio::test]
async fn test_missing_program_is_io_error() {
    let command = CommandSpec::new("small-elt-definitely-not-installed");
    let err = assert_err!(ProcessRunner::new().run(&command, false).await);
    assert!(matches!(err, EltError::Io(_)));
}

#[tokio::test]
async fn test_dropped_run_kills_the_child() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("finished");
    let command = CommandSpec::new("sh").args([
        "-c".to_string(),
        format!("sleep 1; touch '{}'", marker.display()),
    ]);

    let runner = ProcessRunner::new();
    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), runner.run(&command, true)).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert!(!marker.exists());
}
