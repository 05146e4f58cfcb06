//! `thermo query` — evaluate the table at one or more redshifts.

use crate::helpers;
use crate::{GlobalConfiguration, Subcommand};
use anyhow::Result;
use clap::Parser;
use prettytable::row;
use std::path::PathBuf;
use std::process::ExitCode;
use thermo::energy_injection::NoInjection;
use thermo::interpolation::QueryCursor;

/// Evaluates a computed thermo history at one or more redshifts.
#[derive(Parser)]
pub struct Opts {
    /// Path to a YAML cosmology configuration.
    config: PathBuf,
    /// Redshifts to query, ascending or not; each is resolved independently.
    #[arg(required = true)]
    z: Vec<f64>,
}

impl Subcommand for Opts {
    fn run(&self, _: &GlobalConfiguration) -> Result<ExitCode> {
        let config = helpers::read_config(&self.config)?;
        let background = helpers::build_background(&config)?;
        let handle = thermo::init(&config.thermo, &background, &NoInjection, None)?;

        let mut table = helpers::create_table();
        table.set_titles(row![c => "z", "x_e", "dkappa", "g", "t_b", "cb2", "tau_d"]);

        let mut cursor = QueryCursor::Normal;
        for &z in &self.z {
            let (row, idx) = handle.at_z(z, &background, cursor)?;
            cursor = QueryCursor::CloseBy(idx);
            table.add_row(row![r =>
                format!("{z:.4}"),
                format!("{:.6e}", row.x_e),
                format!("{:.6e}", row.dkappa),
                format!("{:.6e}", row.g),
                format!("{:.4}", row.t_b),
                format!("{:.6e}", row.cb2),
                format!("{:.6}", row.tau_d),
            ]);
        }
        table.printstd();

        Ok(ExitCode::SUCCESS)
    }
}
