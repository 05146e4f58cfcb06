//! Shared CLI plumbing: config loading, background construction, table formatting.

use crate::background::{BackgroundParams, FlatLcdmBackground};
use anyhow::{Context, Result};
use prettytable::format::{FormatBuilder, LinePosition, LineSeparator};
use prettytable::Table;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thermo::config::ThermoConfig;

/// Top-level YAML document accepted by every subcommand: the thermo configuration plus the
/// flat-LCDM background parameters `thermo` itself never owns (§1 Non-goals).
#[derive(Deserialize)]
pub struct CliConfig {
    /// Background-cosmology parameters for [`FlatLcdmBackground`].
    pub background: BackgroundParams,
    /// Configuration handed to [`thermo::init`].
    pub thermo: ThermoConfig,
}

/// Reads and parses a YAML cosmology configuration from `path`.
pub fn read_config(path: &Path) -> Result<CliConfig> {
    let file = File::open(path).with_context(|| format!("unable to open '{}'", path.display()))?;
    serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("unable to parse '{}' as a thermo configuration", path.display()))
}

/// Builds the flat-LCDM background named in `config`.
pub fn build_background(config: &CliConfig) -> Result<FlatLcdmBackground> {
    FlatLcdmBackground::new(
        config.background,
        config.thermo.t_cmb,
        config.thermo.n_eff,
        config.thermo.omega_b_h2,
    )
    .map_err(anyhow::Error::from)
}

/// A [`Table`] preformatted the way the teacher's CLI renders its own tabular output.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.set_format(
        FormatBuilder::new()
            .column_separator(' ')
            .separator(LinePosition::Title, LineSeparator::new('-', '+', ' ', ' '))
            .build(),
    );
    table
}
