//! Configuration fields recognized by the thermodynamics core (§6, expanded in §10.2).

use crate::constants::{DEFAULT_TRANSITION_WIDTH, DEFAULT_Z_HE2_LIMIT, DEFAULT_Z_H_LIMIT};
use crate::error::{Error, Result};
use crate::reionization::ReionizationScheme;
use serde::{Deserialize, Serialize};

/// How the primordial helium fraction is determined.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub enum YHeSource {
    /// A fixed, user-supplied value.
    Fixed(f64),
    /// Interpolated from the BBN helium table (§6).
    Bbn,
}

/// Which recombination engine computes the Saha/Peebles right-hand side (§4.3).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub enum RecombinationEngine {
    /// The in-crate Peebles-style three-variable engine.
    R,
    /// A wrapped external single-call kernel.
    H,
}

/// Whether the user specifies reionization by its midpoint redshift or by its integrated
/// optical depth (§4.6).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub enum ReioTarget {
    /// Directly fixes the reionization midpoint redshift.
    Redshift(f64),
    /// Targets an integrated optical depth, triggering the §4.6 bisection.
    OpticalDepth(f64),
}

/// Grid-construction boundaries and resolutions (§4.1, §6).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GridParams {
    /// Earliest (largest) redshift in the table; must exceed the latest helium-recombination
    /// epoch (~5000).
    pub z_initial: f64,
    /// Boundary between the log segment and the linear recombination segment.
    pub z_linear: f64,
    /// Upper bound of the reionization segment; shared with the linear segment's lower bound.
    pub reionization_z_start_max: f64,
    /// Number of points in the log segment.
    pub n_log: usize,
    /// Number of points in the linear recombination segment.
    pub n_lin: usize,
    /// Number of points in the reionization segment.
    pub n_reio: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            z_initial: 5.0e5,
            z_linear: 8000.0,
            reionization_z_start_max: 50.0,
            n_log: 500,
            n_lin: 2500,
            n_reio: 500,
        }
    }
}

/// Tunable precision parameters resolving §9's "phase boundary constants" open question:
/// rather than hard-coding the transition redshifts, they are exposed here with defaults equal
/// to the previously hard-coded values.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PrecisionParams {
    /// Redshift at which hydrogen recombination is considered to have started (§4.4 phase `H`).
    pub z_h_limit: f64,
    /// Redshift at which second helium recombination is considered finished (§4.4 phase
    /// `He1f`/`He2` boundary).
    pub z_he2_limit: f64,
    /// Width of the smoothing overlap applied at every phase transition (§4.4).
    pub transition_width: f64,
    /// Relative tolerance for the τ_reio bisection (§4.6).
    pub tol_tau: f64,
    /// Maximum number of bisection iterations before [`Error::Convergence`] (§4.6).
    pub max_bisection_iterations: usize,
    /// Local-error tolerance handed to the stiff evolver (§4.5).
    pub ode_tolerance: f64,
    /// `x_H` threshold above which the Peebles coefficient `C` collapses to 1 (§4.3).
    pub peebles_trigger: f64,
    /// Ratio `t_Th / t_H` below which the tight-coupling steady-state expansion is used for
    /// `T_mat` (§4.3), called `x_limit` there.
    pub tight_coupling_trigger: f64,
    /// Radius (in samples) of the boxcar smoother applied to the variation rate (§4.7 step 4).
    pub rate_smoothing_radius: usize,
}

impl Default for PrecisionParams {
    fn default() -> Self {
        Self {
            z_h_limit: DEFAULT_Z_H_LIMIT,
            z_he2_limit: DEFAULT_Z_HE2_LIMIT,
            transition_width: DEFAULT_TRANSITION_WIDTH,
            tol_tau: 1.0e-4,
            max_bisection_iterations: 40,
            ode_tolerance: 1.0e-6,
            peebles_trigger: 0.99,
            tight_coupling_trigger: 1.0e-3,
            rate_smoothing_radius: 3,
        }
    }
}

/// Full configuration accepted by [`crate::init`] (§6, expanded in §10.2).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ThermoConfig {
    /// CMB temperature today (K).
    pub t_cmb: f64,
    /// `Omega_b h^2`.
    pub omega_b_h2: f64,
    /// Primordial helium fraction source.
    pub y_he: YHeSource,
    /// Effective number of relativistic neutrino species (used by the BBN interpolation and by
    /// the energy-injection smearing kernel).
    pub n_eff: f64,
    /// Recombination engine selection.
    pub recombination: RecombinationEngine,
    /// Reionization parametrization.
    pub reio_parametrization: ReionizationScheme,
    /// Reionization target: redshift or optical depth.
    pub reio_target: ReioTarget,
    /// Enables the damping-scale column and derived scalar (§4.7 step 2).
    pub compute_damping_scale: bool,
    /// Enables the `dc_b^2/dtau` columns (§3).
    pub compute_cb2_derivatives: bool,
    /// Grid construction parameters.
    pub grid: GridParams,
    /// Precision/tunable numerical parameters.
    pub precision: PrecisionParams,
}

impl ThermoConfig {
    /// Validates cross-field invariants that are cheap to check before the compute phase
    /// starts (§7 "domain violation"). Per-field ranges specific to a component (e.g. a
    /// reionization scheme's own parameters) are validated where that component is
    /// constructed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] on violation.
    pub fn validate(&self) -> Result<()> {
        if let YHeSource::Fixed(y) = self.y_he {
            if !(crate::constants::Y_HE_SMALL..=crate::constants::Y_HE_BIG).contains(&y) {
                return Err(Error::domain(format!(
                    "Y_He = {y} outside supported range [{}, {}]",
                    crate::constants::Y_HE_SMALL,
                    crate::constants::Y_HE_BIG
                )));
            }
        }
        if self.grid.z_initial <= 5000.0 {
            return Err(Error::domain(format!(
                "z_initial = {} must exceed the latest helium-recombination epoch (~5000)",
                self.grid.z_initial
            )));
        }
        if self.grid.n_log == 0 || self.grid.n_lin == 0 || self.grid.n_reio == 0 {
            return Err(Error::domain(
                "grid segment resolutions must all be positive",
            ));
        }
        if self.precision.transition_width <= 0.0 {
            return Err(Error::domain("transition_width must be positive"));
        }
        if let ReioTarget::OpticalDepth(tau) = self.reio_target {
            if tau < 0.0 {
                return Err(Error::domain("target tau_reio must be non-negative"));
            }
            if !matches!(
                self.reio_parametrization,
                ReionizationScheme::Camb { .. } | ReionizationScheme::HalfTanh { .. }
            ) {
                return Err(Error::domain(
                    "reio_target = OpticalDepth requires a single-midpoint reio_parametrization (camb or half_tanh)",
                ));
            }
        }
        Ok(())
    }
}
