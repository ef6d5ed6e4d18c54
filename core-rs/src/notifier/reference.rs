//! In-process reference notifier
//!
//! Implements the notifier's command-line contract over a
//! [`SharedDirectory`]:
//!
//! - argument validation with the notifier's exact diagnostics (exit 2)
//! - the `notify_ttls` schedule when no window is given
//! - `--to-nbdays` alone implies `--dry-run`
//! - dry-run prints the selected entries as a JSON array
//! - otherwise one message per entry with a mail address goes to the
//!   [`MailTransport`]; a transport failure stops the run (exit 1)
//! - `--mail-test` sends a sample message to `smtp_admin`
//!
//! Entries without a mail address are reported on stderr by DN.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use super::{
    AccessPath, NotifiedRecord, NotifierOptions, EXIT_CONFIG, EXIT_SUCCESS, EXIT_TRANSPORT,
    PAYLOAD_TIME_FORMAT,
};
use crate::capture::{capture, ScenarioResult};
use crate::clock::Clock;
use crate::config::EpnConfig;
use crate::errors::Result;
use crate::identity::{IdentityRecord, LdifContext};
use crate::mail::{MailTransport, MessageBuilder};
use crate::store::SharedDirectory;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("placeholder pattern"));

/// Identity used by `--mail-test`
pub const SAMPLE_FIRST: &str = "SAMPLE";
pub const SAMPLE_LAST: &str = "USER";
pub const SAMPLE_UID: &str = "SAUSER";

/// Substitute `{{ name }}` placeholders; unknown names render empty
pub fn render_template(template: &str, vars: &BTreeMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn template_vars(record: &IdentityRecord, mail: &str, expiration: DateTime<Utc>) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("uid", record.login.clone());
    vars.insert("first", record.first_name.clone().unwrap_or_default());
    vars.insert("last", record.last_name.clone().unwrap_or_default());
    vars.insert("fullname", record.full_name());
    vars.insert("mail", mail.to_string());
    vars.insert(
        "expiration",
        expiration.format(PAYLOAD_TIME_FORMAT).to_string(),
    );
    vars
}

pub struct ReferenceNotifier {
    name: String,
    directory: SharedDirectory,
    config: EpnConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn MailTransport>,
}

impl ReferenceNotifier {
    pub fn new(
        name: impl Into<String>,
        directory: SharedDirectory,
        config: EpnConfig,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            directory,
            config,
            clock,
            transport,
        }
    }

    pub fn config(&self) -> &EpnConfig {
        &self.config
    }

    /// Run once, writing to the given streams; returns the exit code
    pub fn run(&self, options: &NotifierOptions, out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        match self.execute(options, out, err) {
            Ok(code) => code,
            Err(e) => {
                warn!(notifier = %self.name, error = %e, "could not write notifier output");
                EXIT_TRANSPORT
            }
        }
    }

    fn execute(
        &self,
        options: &NotifierOptions,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<i32> {
        let plan = match options.plan(&self.config.notify_ttls) {
            Ok(plan) => plan,
            Err(e) => {
                writeln!(err, "{}", e)?;
                return Ok(EXIT_CONFIG);
            }
        };
        let now = self.clock.now();

        if options.mail_test {
            return self.mail_test(now, err);
        }

        let due = match self.directory.due(&plan, now) {
            Ok(due) => due,
            Err(e) => {
                writeln!(err, "IPA-EPN: {}", e)?;
                return Ok(EXIT_TRANSPORT);
            }
        };
        debug!(notifier = %self.name, count = due.len(), ?plan, "selected entries");

        let ctx = LdifContext::for_domain(self.directory.domain());
        for record in due.iter().filter(|r| r.mail.is_empty()) {
            writeln!(
                err,
                "IPA-EPN: No email address defined for: {}",
                ctx.user_dn(&record.login)
            )?;
        }

        if options.is_dry_run() {
            let payload: Vec<NotifiedRecord> = due.iter().map(NotifiedRecord::from).collect();
            let json = serde_json::to_string_pretty(&payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(out, "{}", json)?;
            return Ok(EXIT_SUCCESS);
        }

        let mut sent = 0usize;
        for record in &due {
            let (Some(mail), Some(expiration)) = (record.primary_mail(), record.expiration) else {
                continue;
            };
            if sent > 0 {
                self.pause();
            }
            let body = render_template(&self.config.template, &template_vars(record, mail, expiration));
            if let Err(e) = self.send(mail, body, now) {
                writeln!(err, "{}", e)?;
                return Ok(EXIT_TRANSPORT);
            }
            sent += 1;
        }
        info!(notifier = %self.name, sent, "notifications delivered");
        Ok(EXIT_SUCCESS)
    }

    fn mail_test(&self, now: DateTime<Utc>, err: &mut dyn Write) -> io::Result<i32> {
        let sample = IdentityRecord::new(SAMPLE_UID).with_names(SAMPLE_FIRST, SAMPLE_LAST);
        let recipient = self.config.smtp_admin.clone();
        let body = render_template(&self.config.template, &template_vars(&sample, &recipient, now));
        match self.send(&recipient, body, now) {
            Ok(()) => {
                info!(notifier = %self.name, %recipient, "test message delivered");
                Ok(EXIT_SUCCESS)
            }
            Err(e) => {
                writeln!(err, "{}", e)?;
                Ok(EXIT_TRANSPORT)
            }
        }
    }

    fn send(
        &self,
        recipient: &str,
        body: String,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), crate::errors::TransportError> {
        let raw = MessageBuilder::new(self.config.from_header(), recipient)
            .subject(self.config.msg_subject.clone())
            .body(body)
            .charset(self.config.msg_charset.clone())
            .date(now)
            .build()?;
        self.transport.deliver(recipient, &raw)
    }

    fn pause(&self) {
        if self.config.smtp_delay <= 0.0 {
            return;
        }
        match Duration::try_from_secs_f64(self.config.smtp_delay / 1000.0) {
            Ok(delay) => thread::sleep(delay),
            Err(e) => warn!(
                notifier = %self.name,
                smtp_delay = self.config.smtp_delay,
                error = %e,
                "smtp_delay does not fit a duration, not pausing"
            ),
        }
    }
}

impl AccessPath for ReferenceNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, options: &NotifierOptions) -> Result<ScenarioResult> {
        Ok(capture(|out, err| self.run(options, out, err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_wire_timestamp, FixedClock};
    use crate::compare::{expect_failure, notified_logins, ErrorKind};
    use crate::identity::generator::incremental_population;
    use crate::mail::{ExpectedMail, Mailbox, MemoryMailbox, UnreachableTransport};
    use crate::store::IdentityStore;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        parse_wire_timestamp("20261017120000Z").unwrap()
    }

    fn notifier(directory: SharedDirectory, mailbox: &MemoryMailbox) -> ReferenceNotifier {
        let config = EpnConfig::for_domain("ipa.test");
        ReferenceNotifier::new(
            "reference",
            directory,
            config,
            Arc::new(FixedClock::new(now())),
            Arc::new(mailbox.clone()),
        )
    }

    fn populated() -> SharedDirectory {
        let directory = SharedDirectory::new("ipa.test");
        directory
            .add_batch(&incremental_population(30, now(), "ipa.test").unwrap())
            .unwrap();
        directory
    }

    fn set(uids: &[&str]) -> BTreeSet<String> {
        uids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_template() {
        let mut vars = BTreeMap::new();
        vars.insert("first", "test".to_string());
        vars.insert("last", "user".to_string());
        assert_eq!(
            render_template("Hi {{ first }} {{last}}, {{ unknown }}!", &vars),
            "Hi test user, !"
        );
    }

    #[test]
    fn test_empty_directory_prints_empty_array() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(SharedDirectory::new("ipa.test"), &mailbox)
            .invoke(&NotifierOptions::new().with_dry_run())
            .unwrap();
        assert_eq!(result.stdout, b"[]\n");
        assert!(result.stderr.is_empty());
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_default_schedule_dry_run() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(populated(), &mailbox)
            .invoke(&NotifierOptions::new().with_dry_run())
            .unwrap();
        assert_eq!(
            notified_logins(&result).unwrap(),
            set(&["user1", "user3", "user7", "user14", "user28"])
        );
        assert!(mailbox.handles().unwrap().is_empty());
    }

    #[test]
    fn test_upper_bound_alone_sends_nothing() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(populated(), &mailbox)
            .invoke(&NotifierOptions::new().with_to(5))
            .unwrap();
        assert_eq!(notified_logins(&result).unwrap(), set(&["user4"]));
        assert!(mailbox.handles().unwrap().is_empty());
    }

    #[test]
    fn test_range_without_dry_run_sends_nothing() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(populated(), &mailbox)
            .invoke(&NotifierOptions::new().with_from(7).with_to(15))
            .unwrap();
        assert_eq!(result.exit_code, 0);
        let expected: Vec<String> = (7..15).map(|i| format!("user{}", i)).collect();
        let expected: Vec<&str> = expected.iter().map(String::as_str).collect();
        assert_eq!(notified_logins(&result).unwrap(), set(&expected));
        assert!(mailbox.handles().unwrap().is_empty());
    }

    #[test]
    fn test_payload_sorted_by_expiration() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(populated(), &mailbox)
            .invoke(&NotifierOptions::new().with_from(7).with_to(15).with_dry_run())
            .unwrap();
        let records: Vec<NotifiedRecord> = serde_json::from_slice(&result.stdout).unwrap();
        let uids: Vec<String> = records.into_iter().map(|r| r.uid).collect();
        let expected: Vec<String> = (7..15).map(|i| format!("user{}", i)).collect();
        assert_eq!(uids, expected);
    }

    #[test]
    fn test_invalid_arguments() {
        let mailbox = MemoryMailbox::new();
        let notifier = notifier(populated(), &mailbox);
        let cases = [
            (NotifierOptions::new().with_from(3), ErrorKind::MissingUpperBound),
            (NotifierOptions::new().with_raw_to("abc"), ErrorKind::InvalidUpperBound),
            (NotifierOptions::new().with_raw_to("7.3"), ErrorKind::InvalidUpperBound),
            (NotifierOptions::new().with_from(9).with_to(7), ErrorKind::RangeInverted),
            (
                NotifierOptions::new().with_dry_run().with_mail_test(),
                ErrorKind::ConflictingModes,
            ),
        ];
        for (options, kind) in cases {
            let result = notifier.invoke(&options).unwrap();
            assert_eq!(result.exit_code, EXIT_CONFIG);
            expect_failure(&result, kind).unwrap();
        }
    }

    #[test]
    fn test_delivery_on_default_schedule() {
        let mailbox = MemoryMailbox::new();
        let result = notifier(populated(), &mailbox)
            .invoke(&NotifierOptions::new())
            .unwrap();
        assert!(result.stdout.is_empty());
        assert_eq!(result.exit_code, 0);
        assert_eq!(
            mailbox.handles().unwrap(),
            vec!["user1", "user14", "user28", "user3", "user7"]
        );

        let message = mailbox.read_message("user7").unwrap().unwrap();
        message
            .validate(&ExpectedMail {
                to: "user7@ipa.test".to_string(),
                from: "IPA-EPN <noreply@ipa.test>".to_string(),
                subject: "Your password will expire soon.".to_string(),
                body_contains: "Hi test user,\n\nYour password will expire".to_string(),
            })
            .unwrap();
        assert!(message.body_contains("2026-10-24 12:00:00"));
    }

    #[test]
    fn test_mail_test_goes_to_admin() {
        let mailbox = MemoryMailbox::new();
        let mut config = EpnConfig::for_domain("ipa.test")
            .with_template("Hi {{ first }} {{last}},\nYour login entry {{uid}} is going to expire\n");
        config.smtp_admin = "user2@ipa.test".to_string();
        let notifier = ReferenceNotifier::new(
            "reference",
            populated(),
            config,
            Arc::new(FixedClock::new(now())),
            Arc::new(mailbox.clone()),
        );
        let result = notifier
            .invoke(&NotifierOptions::new().with_mail_test())
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(mailbox.handles().unwrap(), vec!["user2"]);
        let message = mailbox.read_message("user2").unwrap().unwrap();
        assert!(message.body_contains("Hi SAMPLE USER,\nYour login entry SAUSER is going"));
    }

    #[test]
    fn test_smtp_unreachable() {
        let notifier = ReferenceNotifier::new(
            "reference",
            populated(),
            EpnConfig::for_domain("ipa.test"),
            Arc::new(FixedClock::new(now())),
            Arc::new(UnreachableTransport {
                server: "localhost".to_string(),
                port: 25,
            }),
        );
        let result = notifier.invoke(&NotifierOptions::new()).unwrap();
        assert_eq!(result.exit_code, EXIT_TRANSPORT);
        expect_failure(&result, ErrorKind::SmtpUnreachable).unwrap();

        // dry-run never touches the transport
        let result = notifier
            .invoke(&NotifierOptions::new().with_dry_run())
            .unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_oversized_delay_does_not_stop_delivery() {
        let mailbox = MemoryMailbox::new();
        let mut config = EpnConfig::for_domain("ipa.test");
        config.smtp_delay = 1e300;
        let notifier = ReferenceNotifier::new(
            "reference",
            populated(),
            config,
            Arc::new(FixedClock::new(now())),
            Arc::new(mailbox.clone()),
        );
        let result = notifier.invoke(&NotifierOptions::new()).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(mailbox.handles().unwrap().len(), 5);
    }

    #[test]
    fn test_admin_without_mail_is_reported() {
        let directory = SharedDirectory::with_admin("ipa.test").unwrap();
        directory.remove("admin").unwrap();
        let mut admin = IdentityRecord::new("admin").expiring_in(now(), 7);
        admin.last_name = Some("Administrator".to_string());
        directory.add(&admin).unwrap();

        let mailbox = MemoryMailbox::new();
        let result = notifier(directory, &mailbox)
            .invoke(&NotifierOptions::new().with_dry_run())
            .unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stderr_text().contains("uid=admin"));
        assert_eq!(notified_logins(&result).unwrap(), set(&["admin"]));
    }
}
