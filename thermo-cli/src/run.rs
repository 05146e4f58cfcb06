//! `thermo run` — compute the ionization history and print the scalar summary.

use crate::helpers;
use crate::{GlobalConfiguration, Subcommand};
use anyhow::Result;
use clap::Parser;
use prettytable::row;
use std::path::PathBuf;
use std::process::ExitCode;
use thermo::energy_injection::NoInjection;

/// Computes a thermodynamics history from a YAML configuration and prints its scalar summary.
#[derive(Parser)]
pub struct Opts {
    /// Path to a YAML cosmology configuration.
    config: PathBuf,
}

impl Subcommand for Opts {
    fn run(&self, _: &GlobalConfiguration) -> Result<ExitCode> {
        let config = helpers::read_config(&self.config)?;
        let background = helpers::build_background(&config)?;

        let handle = thermo::init(&config.thermo, &background, &NoInjection, None)?;
        let summary = handle.table().summary;

        let mut table = helpers::create_table();
        table.set_titles(row![c => "quantity", "value"]);
        table.add_row(row![r => "z_rec", format!("{:.4}", summary.z_rec)]);
        table.add_row(row![r => "z_d", format!("{:.4}", summary.z_d)]);
        table.add_row(row![r => "z_reio", format!("{:.4}", summary.z_reio)]);
        table.add_row(row![r => "tau_reio", format!("{:.6}", summary.tau_reio)]);
        table.add_row(row![r => "r_s_rec [Mpc]", format!("{:.4}", summary.r_s_rec)]);
        table.add_row(row![r => "r_s_d [Mpc]", format!("{:.4}", summary.r_s_d)]);
        table.add_row(row![r => "d_a_rec [Mpc]", format!("{:.4}", summary.d_a_rec)]);
        table.add_row(row![r => "tau_fs [Mpc]", format!("{:.4}", summary.tau_fs)]);
        table.add_row(row![r => "tau_cut [Mpc]", format!("{:.4}", summary.tau_cut)]);
        if let Some(r_d_rec) = summary.r_d_rec {
            table.add_row(row![r => "r_d_rec [Mpc]", format!("{:.4}", r_d_rec)]);
        }
        table.printstd();

        Ok(ExitCode::SUCCESS)
    }
}
