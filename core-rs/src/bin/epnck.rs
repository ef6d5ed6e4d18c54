//! epnck - EPN expiration oracle and scenario harness
//!
//! See `epn_oracle::cli` for the subcommands.

use std::io::Write;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();

    let code = epn_oracle::cli::run(std::env::args_os(), &mut out, &mut err);

    out.flush().context("failed to flush stdout")?;
    err.flush().context("failed to flush stderr")?;
    std::process::exit(code);
}
