//! `thermo table` — dump the full frozen thermo table.

use crate::helpers;
use crate::{GlobalConfiguration, Subcommand};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thermo::energy_injection::NoInjection;

/// Output encoding for `thermo table`.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Csv,
    Json,
}

/// Dumps the frozen thermo table, one row per grid point.
#[derive(Parser)]
pub struct Opts {
    /// Path to a YAML cosmology configuration.
    config: PathBuf,
    /// Output encoding.
    #[arg(long, value_enum, default_value = "csv")]
    format: Format,
    /// Write to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Subcommand for Opts {
    fn run(&self, _: &GlobalConfiguration) -> Result<ExitCode> {
        let config = helpers::read_config(&self.config)?;
        let background = helpers::build_background(&config)?;
        let handle = thermo::init(&config.thermo, &background, &NoInjection, None)?;

        let mut sink: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(
                File::create(path).with_context(|| format!("unable to create '{}'", path.display()))?,
            ),
            None => Box::new(stdout()),
        };

        match self.format {
            Format::Csv => {
                let mut writer = csv::Writer::from_writer(&mut sink);
                for row in &handle.table().rows {
                    writer.serialize(row)?;
                }
                writer.flush()?;
            }
            Format::Json => {
                serde_json::to_writer_pretty(&mut sink, &handle.table().rows)?;
                writeln!(sink)?;
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}
