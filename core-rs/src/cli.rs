//! `epnck` command line
//!
//! All output goes through the writers handed to [`run`], so the binary is a
//! thin wrapper and tests can drive every subcommand in process.
//!
//! ```text
//! epnck expect   --now 20261017120000Z --directory users.yaml --to-nbdays 15
//! epnck simulate --directory users.yaml --spool /tmp/mail --dry-run
//! epnck run      --harness epnck.yaml --scenario defaultSchedule
//! epnck classify result.json
//! ```

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::capture::ScenarioResult;
use crate::clock::{parse_wire_timestamp, Clock, FixedClock, SystemClock};
use crate::compare::classify;
use crate::config::harness::DEFAULT_FILE;
use crate::config::{EpnConfig, HarnessConfig};
use crate::errors::{EpnError, Result};
use crate::mail::{MailTransport, SpoolMailbox, UnreachableTransport};
use crate::notifier::{
    AccessPath, NotifierOptions, ReferenceNotifier, EXIT_CONFIG, EXIT_SUCCESS, EXIT_TRANSPORT,
};
use crate::runner::{EnvironmentFixture, Scenario, ScenarioReport, ScenarioRunner};
use crate::store::SharedDirectory;
use crate::window::{expected_for_plan, NotificationPlan};

/// Domain used when no directory file names one
pub const DEFAULT_DOMAIN: &str = "ipa.test";

#[derive(Parser, Debug)]
#[command(name = "epnck")]
#[command(version)]
#[command(about = "Expiration window oracle and two-path EPN harness", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the logins a notifier should select, one per line
    Expect {
        #[command(flatten)]
        source: DirectoryArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Notifier configuration providing notify_ttls
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the reference notifier
    Simulate {
        #[command(flatten)]
        source: DirectoryArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Notifier configuration (epn.conf)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Deliver mail as files under this directory; without it the
        /// configured SMTP server is unreachable
        #[arg(long)]
        spool: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        mail_test: bool,
    },
    /// Run scenarios against the access paths of a harness file
    Run {
        #[arg(long, default_value = DEFAULT_FILE)]
        harness: PathBuf,
        /// Scenario to run; may be repeated
        #[arg(long = "scenario")]
        scenarios: Vec<String>,
        /// Print report summaries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify a captured result (JSON with stdout, stderr, exitCode)
    Classify { result: PathBuf },
}

#[derive(Args, Debug)]
struct DirectoryArgs {
    /// Identity directory (YAML with domain and identities)
    #[arg(long)]
    directory: Option<PathBuf>,
    /// Pin "now" to a wire timestamp (YYYYMMDDHHMMSSZ)
    #[arg(long)]
    now: Option<String>,
}

#[derive(Args, Debug)]
struct WindowArgs {
    #[arg(long = "from-nbdays", allow_hyphen_values = true)]
    from_nbdays: Option<String>,
    #[arg(long = "to-nbdays", allow_hyphen_values = true)]
    to_nbdays: Option<String>,
}

/// Set up `tracing` on stderr; `RUST_LOG` wins over `verbose`
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse `args` (program name first) and run; returns the exit code
pub fn run<I, T>(args: I, out: &mut dyn Write, err: &mut dyn Write) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            return match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                    let _ = write!(out, "{}", e);
                    EXIT_SUCCESS
                }
                _ => {
                    let _ = write!(err, "{}", e);
                    EXIT_CONFIG
                }
            };
        }
    };

    init_logging(cli.verbose);
    debug!(command = ?cli.command, "epnck");

    let outcome = match cli.command {
        Commands::Expect {
            source,
            window,
            config,
        } => handle_expect(&source, &window, config.as_deref(), out, err),
        Commands::Simulate {
            source,
            window,
            config,
            spool,
            dry_run,
            mail_test,
        } => {
            let options = NotifierOptions {
                from_days: window.from_nbdays,
                to_days: window.to_nbdays,
                dry_run,
                mail_test,
            };
            handle_simulate(&source, &options, config.as_deref(), spool, out, err)
        }
        Commands::Run {
            harness,
            scenarios,
            json,
        } => handle_run(&harness, &scenarios, json, out, err),
        Commands::Classify { result } => handle_classify(&result, out),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(err, "epnck: {}", e);
            EXIT_TRANSPORT
        }
    }
}

fn clock_for(now: Option<&str>) -> Result<Arc<dyn Clock>> {
    Ok(match now {
        Some(text) => Arc::new(FixedClock::new(parse_wire_timestamp(text)?)),
        None => Arc::new(SystemClock),
    })
}

fn load_directory(path: Option<&Path>) -> Result<SharedDirectory> {
    match path {
        Some(path) => SharedDirectory::load_file(path),
        None => Ok(SharedDirectory::new(DEFAULT_DOMAIN)),
    }
}

/// Notifier configuration; rejected files print the notifier's diagnostic
fn load_epn_config(
    path: Option<&Path>,
    domain: &str,
    err: &mut dyn Write,
) -> Result<Option<EpnConfig>> {
    let path = match path {
        Some(path) => path,
        None => return Ok(Some(EpnConfig::for_domain(domain))),
    };
    match EpnConfig::load(path, domain) {
        Ok(config) => Ok(Some(config)),
        Err(EpnError::Config(e)) => {
            writeln!(err, "{}", e)?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn handle_expect(
    source: &DirectoryArgs,
    window: &WindowArgs,
    config: Option<&Path>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let directory = load_directory(source.directory.as_deref())?;
    let now = clock_for(source.now.as_deref())?.now();
    let Some(config) = load_epn_config(config, directory.domain(), err)? else {
        return Ok(EXIT_CONFIG);
    };

    let plan = match NotificationPlan::from_args(
        window.from_nbdays.as_deref(),
        window.to_nbdays.as_deref(),
        &config.notify_ttls,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            writeln!(err, "{}", e)?;
            return Ok(EXIT_CONFIG);
        }
    };

    let identities = directory.snapshot()?;
    for login in expected_for_plan(&identities, &plan, now) {
        writeln!(out, "{}", login)?;
    }
    Ok(EXIT_SUCCESS)
}

fn handle_simulate(
    source: &DirectoryArgs,
    options: &NotifierOptions,
    config: Option<&Path>,
    spool: Option<PathBuf>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    let directory = load_directory(source.directory.as_deref())?;
    let clock = clock_for(source.now.as_deref())?;
    let Some(config) = load_epn_config(config, directory.domain(), err)? else {
        return Ok(EXIT_CONFIG);
    };

    let transport: Arc<dyn MailTransport> = match spool {
        Some(dir) => Arc::new(SpoolMailbox::new(dir)),
        None => Arc::new(UnreachableTransport {
            server: config.smtp_server.clone(),
            port: config.smtp_port,
        }),
    };

    let notifier = ReferenceNotifier::new("simulate", directory, config, clock, transport);
    Ok(notifier.run(options, out, err))
}

fn handle_run(
    harness: &Path,
    names: &[String],
    json: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<i32> {
    if !harness.exists() {
        writeln!(
            err,
            "epnck: harness is not configured: {} does not exist",
            harness.display()
        )?;
        return Ok(EXIT_TRANSPORT);
    }

    let config = HarnessConfig::load(harness)?;
    let recipient = config.spec.mail_test_recipient.as_deref();

    let requested: Vec<String> = if names.is_empty() {
        config.spec.scenarios.clone().unwrap_or_default()
    } else {
        names.to_vec()
    };
    let scenarios = if requested.is_empty() {
        Scenario::catalogue(recipient)
    } else {
        let mut scenarios = Vec::with_capacity(requested.len());
        for name in &requested {
            match Scenario::from_name(name, recipient) {
                Some(scenario) => scenarios.push(scenario),
                None => {
                    writeln!(err, "epnck: unknown scenario: {}", name)?;
                    return Ok(EXIT_CONFIG);
                }
            }
        }
        scenarios
    };

    let epn_config = config.epn_config()?;
    let fixture = EnvironmentFixture::new(
        Box::new(config.store()),
        Box::new(config.mailbox()),
        Arc::new(SystemClock),
        config.spec.domain.clone(),
    );
    let paths = config.access_paths();
    let (left, right): (&dyn AccessPath, &dyn AccessPath) = (&paths[0], &paths[1]);
    let runner =
        ScenarioRunner::new(&fixture, left, right).with_schedule(epn_config.notify_ttls.clone());

    let reports = runner.run_all(&scenarios)?;
    if json {
        let summaries: Vec<_> = reports.iter().map(ScenarioReport::summary).collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&summaries)?)?;
    } else {
        print_reports(&reports, out)?;
    }

    Ok(if reports.iter().all(ScenarioReport::passed) {
        EXIT_SUCCESS
    } else {
        EXIT_TRANSPORT
    })
}

/// Human-readable report, one line per scenario plus failing checks
pub fn print_reports(reports: &[ScenarioReport], out: &mut dyn Write) -> std::io::Result<()> {
    for report in reports {
        let status = if report.passed() {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        writeln!(out, "{} {} ({} checks)", status, report.scenario, report.checks.len())?;
        for check in report.failures() {
            if let Err(e) = &check.outcome {
                writeln!(out, "    {}: {}", check.name, e)?;
            }
        }
        for warning in &report.warnings {
            writeln!(out, "    {} {}", "warning:".yellow(), warning)?;
        }
    }
    let passed = reports.iter().filter(|r| r.passed()).count();
    writeln!(out, "{}/{} scenarios passed", passed, reports.len())?;
    Ok(())
}

fn handle_classify(path: &Path, out: &mut dyn Write) -> Result<i32> {
    if !path.exists() {
        return Err(EpnError::FileNotFound(path.to_string_lossy().to_string()));
    }
    let result: ScenarioResult = serde_json::from_str(&fs::read_to_string(path)?)?;
    writeln!(out, "{}", classify(&result))?;
    Ok(EXIT_SUCCESS)
}
