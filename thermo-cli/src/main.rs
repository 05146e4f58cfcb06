#![allow(missing_docs)]

use clap::Parser;
use std::process::{ExitCode, Termination};
use thermo_cli::{Opts, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let opts = Opts::parse();

    let filter = match opts.configuration.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match opts.subcommand.run(&opts.configuration) {
        Ok(code) => code,
        result @ Err(_) => result.report(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_command() {
        use clap::CommandFactory;
        Opts::command().debug_assert();
    }
}
