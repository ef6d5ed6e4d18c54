//! Integration tests for the epnck binary
//!
//! These run the built binary, so they cover argument parsing, exit codes
//! and the split between stdout and stderr end to end.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

use epn_oracle::clock::{parse_wire_timestamp, FixedClock};
use epn_oracle::compare::{classify, expect_same_across_paths, Outcome};
use epn_oracle::identity::generator::incremental_population;
use epn_oracle::{
    AccessPath, CommandAccessPath, EpnConfig, IdentityStore, MemoryMailbox, NotifierOptions,
    ReferenceNotifier, SharedDirectory,
};
use tempfile::TempDir;

const EPNCK: &str = env!("CARGO_BIN_EXE_epnck");
const NOW: &str = "20261017120000Z";

fn epnck(args: &[&str]) -> Output {
    Command::new(EPNCK)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run epnck")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Directory file with user0..user29, user<i> expiring in i days
fn write_population(dir: &Path) -> (SharedDirectory, String) {
    let now = parse_wire_timestamp(NOW).unwrap();
    let directory = SharedDirectory::new("ipa.test");
    directory
        .add_batch(&incremental_population(30, now, "ipa.test").unwrap())
        .unwrap();
    let path = dir.join("users.yaml");
    directory.save_file(&path).unwrap();
    (directory, path.to_string_lossy().to_string())
}

#[test]
fn test_version_and_help() {
    let output = epnck(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("epnck"));

    let output = epnck(&["--help"]);
    assert!(output.status.success());
    for command in ["expect", "simulate", "run", "classify"] {
        assert!(stdout(&output).contains(command), "help lists {}", command);
    }
}

#[test]
fn test_run_without_harness_is_not_configured() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("epnck.yaml");
    let output = epnck(&["run", "--harness", missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("not configured"));
    assert!(!err.contains("/var/log"));
}

#[test]
fn test_expect_prints_sorted_logins() {
    let temp = TempDir::new().unwrap();
    let (_, path) = write_population(temp.path());

    let output = epnck(&[
        "expect",
        "--now",
        NOW,
        "--directory",
        &path,
        "--from-nbdays",
        "7",
        "--to-nbdays",
        "10",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "user7\nuser8\nuser9\n");

    // no bounds: the default schedule
    let output = epnck(&["expect", "--now", NOW, "--directory", &path]);
    assert_eq!(stdout(&output), "user1\nuser14\nuser28\nuser3\nuser7\n");
}

#[test]
fn test_expect_rejects_inverted_range() {
    let output = epnck(&["expect", "--now", NOW, "--from-nbdays", "9", "--to-nbdays", "7"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert_eq!(
        stderr(&output).trim_end(),
        "error: --from-nbdays must be smaller than --to-nbdays."
    );
}

#[test]
fn test_simulate_dry_run_payload() {
    let temp = TempDir::new().unwrap();
    let (_, path) = write_population(temp.path());

    let output = epnck(&[
        "simulate",
        "--now",
        NOW,
        "--directory",
        &path,
        "--to-nbdays",
        "5",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("\"uid\": \"user4\""));
    assert!(text.contains("\"krbpasswordexpiration\": \"2026-10-21 12:00:00\""));
}

#[test]
fn test_simulate_delivers_to_spool() {
    let temp = TempDir::new().unwrap();
    let (_, path) = write_population(temp.path());
    let spool = temp.path().join("mail");
    fs::create_dir_all(&spool).unwrap();

    let output = epnck(&[
        "simulate",
        "--now",
        NOW,
        "--directory",
        &path,
        "--spool",
        spool.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(output.stdout.is_empty());

    let mail = fs::read_to_string(spool.join("user7")).unwrap();
    assert!(mail.contains("To: user7@ipa.test"));
    assert!(!spool.join("user8").exists());
}

#[test]
fn test_simulate_rejects_bad_smtp_delay() {
    let temp = TempDir::new().unwrap();
    let conf = temp.path().join("epn.conf");

    fs::write(&conf, "[global]\nsmtp_delay=abc\n").unwrap();
    let output = epnck(&["simulate", "--dry-run", "--config", conf.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("could not convert string to float: 'abc'"));

    fs::write(&conf, "[global]\nsmtp_delay=-1\n").unwrap();
    let output = epnck(&["simulate", "--dry-run", "--config", conf.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("smtp_delay cannot be less than zero"));
}

#[test]
fn test_classify_captured_result() {
    let temp = TempDir::new().unwrap();
    let result = temp.path().join("result.json");
    fs::write(
        &result,
        r#"{"stdout": "", "stderr": "You cannot specify --mail-test and --dry-run together\n", "exitCode": 2}"#,
    )
    .unwrap();

    let output = epnck(&["classify", result.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim_end(), "failure 2 (conflicting modes)");
}

/// The binary and the in-process notifier are two access paths to the same
/// directory and must print identical payloads
#[test]
fn test_binary_and_library_paths_agree() {
    let temp = TempDir::new().unwrap();
    let (directory, path) = write_population(temp.path());

    let binary = CommandAccessPath::new("epnck", EPNCK).with_args(vec![
        "simulate".to_string(),
        "--now".to_string(),
        NOW.to_string(),
        "--directory".to_string(),
        path,
    ]);
    let library = ReferenceNotifier::new(
        "library",
        directory,
        EpnConfig::for_domain("ipa.test"),
        Arc::new(FixedClock::new(parse_wire_timestamp(NOW).unwrap())),
        Arc::new(MemoryMailbox::new()),
    );

    for options in [
        NotifierOptions::new().with_dry_run(),
        NotifierOptions::new().with_from(3).with_to(12).with_dry_run(),
        NotifierOptions::new().with_raw_to("abc"),
    ] {
        let left = binary.invoke(&options).unwrap();
        let right = library.invoke(&options).unwrap();
        expect_same_across_paths(binary.name(), &left, library.name(), &right).unwrap();
    }

    let rejected = binary
        .invoke(&NotifierOptions::new().with_from(3))
        .unwrap();
    assert!(matches!(classify(&rejected), Outcome::Failure { exit_code: 2, .. }));
}
