// Diagnostic Text Contract Tests
//
// Negative scenarios recognise a notifier failure by a literal substring of
// its stderr. The texts below are what deployed notifiers print; changing a
// single character makes every negative scenario report a mismatch.
//
// **Problem**: "improving" an error message breaks matching against real notifiers
// **Solution**: pin each diagnostic and its classification

use epn_oracle::compare::{classify, expect_failure, Outcome};
use epn_oracle::config::EpnConfig;
use epn_oracle::notifier::{EXIT_CONFIG, EXIT_TRANSPORT};
use epn_oracle::{ConfigError, ErrorKind, NotificationWindow, NotifierOptions, ScenarioResult};

fn rejection(options: &NotifierOptions) -> ConfigError {
    options
        .plan(&[28, 14, 7, 3, 1])
        .expect_err("options should be rejected")
}

/// WHY: Each malformed argument set maps to exactly one diagnostic
/// REASON: Checks run in a fixed order, so `--from-nbdays 3` alone reports the
///         missing upper bound even though nothing else is wrong
/// BREAKS: Negative scenarios if the order changes
#[test]
fn argument_errors_have_fixed_texts() {
    let cases = [
        (
            NotifierOptions::new().with_from(3),
            "You cannot specify --from-nbdays without --to-nbdays",
        ),
        (
            NotifierOptions::new().with_raw_to("abc"),
            "error: --to-nbdays must be a positive integer.",
        ),
        (
            NotifierOptions::new().with_raw_to("7.3"),
            "error: --to-nbdays must be a positive integer.",
        ),
        (
            NotifierOptions::new().with_to(0),
            "error: --to-nbdays must be a positive integer.",
        ),
        (
            NotifierOptions::new().with_from(-1).with_to(5),
            "error: --from-nbdays must be a positive integer.",
        ),
        (
            NotifierOptions::new().with_from(9).with_to(7),
            "error: --from-nbdays must be smaller than --to-nbdays.",
        ),
        (
            NotifierOptions::new().with_mail_test().with_dry_run(),
            "You cannot specify --mail-test and --dry-run together",
        ),
    ];

    for (options, text) in cases {
        assert_eq!(rejection(&options).to_string(), text, "options: {:?}", options);
    }
}

/// WHY: A missing upper bound wins over a conflicting mode
/// REASON: The notifier checks the window before the modes
#[test]
fn missing_upper_bound_is_checked_first() {
    let options = NotifierOptions::new()
        .with_from(3)
        .with_mail_test()
        .with_dry_run();
    assert_eq!(rejection(&options), ConfigError::MissingUpperBound);
}

/// WHY: An equal lower and upper bound is an inverted range
/// REASON: `[t, t)` is empty and the notifier rejects it rather than printing `[]`
#[test]
fn empty_range_is_inverted() {
    assert!(matches!(
        NotificationWindow::new(7, 7),
        Err(ConfigError::RangeInverted { from: 7, to: 7 })
    ));
}

/// WHY: Diagnostic families are told apart by substring in a fixed order
/// REASON: "You cannot specify" prefixes both the missing-bound and the
///         conflicting-modes texts, so the specific one must match first
#[test]
fn error_kinds_classify_their_own_text() {
    for kind in ErrorKind::ALL {
        let stderr = format!("{}\n", kind.needle());
        assert_eq!(ErrorKind::from_stderr(&stderr), Some(kind));
    }
    assert_eq!(
        ErrorKind::from_stderr("You cannot specify --mail-test and --dry-run together\n"),
        Some(ErrorKind::ConflictingModes)
    );
}

/// WHY: A clean failure needs the diagnostic and a non-zero exit code
/// REASON: A notifier printing the right text but exiting 0 still misbehaves
#[test]
fn clean_failure_requires_non_zero_exit() {
    let text = "error: --to-nbdays must be a positive integer.\n";
    let rejected = ScenarioResult::new("", text, EXIT_CONFIG);
    assert!(expect_failure(&rejected, ErrorKind::InvalidUpperBound).is_ok());
    assert_eq!(
        classify(&rejected),
        Outcome::Failure {
            exit_code: EXIT_CONFIG,
            kind: Some(ErrorKind::InvalidUpperBound)
        }
    );

    let exited_zero = ScenarioResult::new("", text, 0);
    assert!(expect_failure(&exited_zero, ErrorKind::InvalidUpperBound).is_err());
}

/// WHY: Failures must not point users at log files
/// FORBIDDEN: "/var/log" anywhere in stderr of a rejected run
/// REASON: The notifier's diagnostics are self-contained; a log path means a
///         crash handler ran instead of argument validation
#[test]
fn failures_do_not_leak_log_paths() {
    let stderr = "error: --to-nbdays must be a positive integer.\n\
                  See /var/log/ipaepn.log for details\n";
    let result = ScenarioResult::new("", stderr, EXIT_CONFIG);
    assert!(expect_failure(&result, ErrorKind::InvalidUpperBound).is_err());
}

/// WHY: An unreachable mail server is a transport failure, not a config error
/// REASON: Exit code 1 and the server named as `host:port`
#[test]
fn unreachable_smtp_server_text() {
    let err = epn_oracle::TransportError::Unreachable {
        server: "localhost".to_string(),
        port: 25,
    };
    assert_eq!(
        err.to_string(),
        "IPA-EPN: Could not connect to the configured SMTP server: localhost:25"
    );
    let result = ScenarioResult::new("", format!("{}\n", err), EXIT_TRANSPORT);
    assert!(expect_failure(&result, ErrorKind::SmtpUnreachable).is_ok());
}

/// WHY: smtp_delay is validated with the notifier's own texts
/// REASON: A bad epn.conf must stop the notifier before it sends anything
#[test]
fn smtp_delay_errors() {
    let err = EpnConfig::parse("[global]\nsmtp_delay=abc\n", "ipa.test").unwrap_err();
    assert_eq!(err.to_string(), "could not convert string to float: 'abc'");

    let err = EpnConfig::parse("[global]\nsmtp_delay=-1\n", "ipa.test").unwrap_err();
    assert_eq!(err.to_string(), "smtp_delay cannot be less than zero");

    let err = EpnConfig::parse("[global]\nsmtp_delay=inf\n", "ipa.test").unwrap_err();
    assert_eq!(err.to_string(), "could not convert string to float: 'inf'");

    let config = EpnConfig::parse("[global]\nsmtp_delay=2.5\n", "ipa.test").unwrap();
    assert_eq!(config.smtp_delay, 2.5);
}
