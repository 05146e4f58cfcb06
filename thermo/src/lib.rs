#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::cognitive_complexity, clippy::similar_names, clippy::too_many_lines)]

//! Ionization history of the early universe: recombination, reionization, and optical depth.
//!
//! The compute phase ([`init`]) runs once and produces an immutable [`ThermoTable`] plus a
//! scalar [`ThermoSummary`]; [`at_z`] is the only query surface afterward (§5, §6).

pub mod background;
pub mod bbn;
pub mod config;
pub mod constants;
pub mod convert;
pub mod derived;
pub mod energy_injection;
pub mod error;
pub mod evolver;
pub mod grid;
pub mod interpolation;
pub mod recombination;
pub mod reionization;
pub mod scheduler;
pub mod shooting;
pub mod spline;
pub mod table;

pub use error::{Error, Result};
pub use table::{ThermoRow, ThermoSummary, ThermoTable};

use background::Background;
use bbn::BbnTable;
use config::{ReioTarget, ThermoConfig, YHeSource};
use energy_injection::EnergyInjection;
use interpolation::{InterpolationService, QueryCursor};
use tracing::{info, warn};

/// A computed thermodynamics history, ready to be queried via [`ThermoHandle::at_z`] (§6
/// `init`/`at_z`/`free`; `free` is simply this value's `Drop`).
pub struct ThermoHandle {
    table: ThermoTable,
    service: InterpolationService,
}

impl ThermoHandle {
    /// Evaluates the history at `z`, dispatching per §4.8.
    ///
    /// # Errors
    ///
    /// Propagates errors from the background collaborator queried for `tau(z)`.
    pub fn at_z<B: Background>(
        &self,
        z: f64,
        background: &B,
        cursor: QueryCursor,
    ) -> Result<(ThermoRow, usize)> {
        self.service.at_z(z, background, cursor)
    }

    /// The frozen table backing this handle.
    #[must_use]
    pub fn table(&self) -> &ThermoTable {
        &self.table
    }
}

/// Runs the full compute phase: grid construction (C1), staged evolution (C3-C5), optional
/// τ_reio shooting (C6), and the derived-quantity pass (C7), freezing the result behind a
/// [`ThermoHandle`] ready for [`ThermoHandle::at_z`] queries (C8).
///
/// `bbn_table` is only consulted when `config.y_he` is [`YHeSource::Bbn`]; pass `None` to use
/// [`YHeSource::Fixed`] exclusively.
///
/// # Errors
///
/// Returns [`Error::Domain`] if `config` fails [`ThermoConfig::validate`], and propagates every
/// other error kind of §7 raised by the grid builder, evolver, shooting procedure, or derived
/// pass.
pub fn init<B: Background, E: EnergyInjection>(
    config: &ThermoConfig,
    background: &B,
    injection: &E,
    bbn_table: Option<&BbnTable>,
) -> Result<ThermoHandle> {
    let span = tracing::info_span!(
        "thermo_init",
        t_cmb = config.t_cmb,
        omega_b_h2 = config.omega_b_h2,
        recombination = ?config.recombination,
    );
    let _enter = span.enter();

    config.validate()?;
    config.reio_parametrization.validate()?;

    let y_he = resolve_y_he(config, bbn_table)?;
    info!(y_he, "resolved primordial helium fraction");

    warn_on_unphysical_combinations(config);

    let grid = grid::build(&config.grid, background)?;

    let (rows, z_reio, tau_reio) = match config.reio_target {
        ReioTarget::Redshift(z) => {
            let (rows, _xe_before) = evolver::run(config, &grid, background, injection, y_he)?;
            let tau = shooting::tau_reio_of_rows(&rows, config.grid.reionization_z_start_max);
            (rows, z, tau)
        }
        ReioTarget::OpticalDepth(_) => shooting::solve(config, &grid, background, injection, y_he)?,
    };

    let mut table = derived::run(config, background, rows)?;
    table.summary.z_reio = z_reio;
    table.summary.tau_reio = tau_reio;

    let service = InterpolationService::build(&table, &config.reio_parametrization, config.t_cmb)?;

    info!(
        z_rec = table.summary.z_rec,
        z_d = table.summary.z_d,
        z_reio = table.summary.z_reio,
        tau_reio = table.summary.tau_reio,
        "compute phase finished"
    );

    Ok(ThermoHandle { table, service })
}

/// Resolves `config.y_he` to a numerical value (§6 "`YHe` (number or `BBN`)").
///
/// # Errors
///
/// Returns [`Error::Domain`] if [`YHeSource::Bbn`] is selected without a `bbn_table`, or
/// propagates [`Error::Bbn`] from the table lookup.
fn resolve_y_he(config: &ThermoConfig, bbn_table: Option<&BbnTable>) -> Result<f64> {
    match config.y_he {
        YHeSource::Fixed(y) => Ok(y),
        YHeSource::Bbn => {
            let table = bbn_table.ok_or_else(|| {
                Error::domain("YHeSource::Bbn requires a BBN table to be supplied to init")
            })?;
            table.y_he(config.omega_b_h2, config.n_eff - 3.046)
        }
    }
}

/// Emits the §7 non-fatal warning for a potentially unphysical combination: helium-switch ≥ 3
/// together with DM annihilation and no reionization. Engine R always runs with helium-switch 1
/// in this crate (see [`evolver::run`]); this check is kept for configurations that may raise it
/// via future precision-parameter exposure.
fn warn_on_unphysical_combinations(config: &ThermoConfig) {
    if matches!(config.reio_parametrization, reionization::ReionizationScheme::None) {
        warn!("no reionization scheme configured: x_e(z=0) will equal the recombination residual");
    }
}
