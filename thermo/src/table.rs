//! Frozen thermodynamics table, the data model of §3.
//!
//! Built once by the compute phase (C1-C7) and immutable from then on; [`crate::interpolation`]
//! (C8) is the only reader once [`crate::init`] has returned.

use serde::{Deserialize, Serialize};

/// One row of the thermo table, indexed by grid point.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct ThermoRow {
    /// Redshift.
    pub z: f64,
    /// Conformal time (Mpc).
    pub tau: f64,
    /// Free-electron fraction `x_e`.
    pub x_e: f64,
    /// Differential optical depth per unit conformal time, `dκ/dτ` (1/Mpc).
    pub dkappa: f64,
    /// `d²κ/dτ²`.
    pub ddkappa: f64,
    /// `d³κ/dτ³`.
    pub dddkappa: f64,
    /// Survival probability `exp(−κ)`.
    pub exp_minus_kappa: f64,
    /// Visibility function `g = (dκ/dτ)·exp(−κ)`.
    pub g: f64,
    /// `dg/dτ`.
    pub dg: f64,
    /// `d²g/dτ²`.
    pub ddg: f64,
    /// Baryon (matter) temperature (K).
    pub t_b: f64,
    /// Baryon sound speed squared.
    pub cb2: f64,
    /// Conformal drag time (crosses 1 at the drag epoch).
    pub tau_d: f64,
    /// Comoving photon damping scale (Mpc), populated only when
    /// [`crate::config::ThermoConfig::compute_damping_scale`] is set.
    pub r_d: Option<f64>,
    /// `dc_b²/dτ`, populated only when
    /// [`crate::config::ThermoConfig::compute_cb2_derivatives`] is set.
    pub dcb2: Option<f64>,
    /// `d²c_b²/dτ²`, populated only when
    /// [`crate::config::ThermoConfig::compute_cb2_derivatives`] is set.
    pub ddcb2: Option<f64>,
    /// Smoothed maximum variation rate, used by downstream modules to pace their own sampling.
    pub rate: f64,
}

/// Characteristic epochs and integrated quantities computed once per table (§3 "Scalars").
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct ThermoSummary {
    /// Recombination redshift (location of peak visibility).
    pub z_rec: f64,
    /// Drag redshift (where `tau_d` crosses 1).
    pub z_d: f64,
    /// Reionization redshift.
    pub z_reio: f64,
    /// Integrated optical depth to reionization.
    pub tau_reio: f64,
    /// Comoving sound horizon at recombination (Mpc).
    pub r_s_rec: f64,
    /// Comoving sound horizon at the drag epoch (Mpc).
    pub r_s_d: f64,
    /// Angular diameter distance to recombination (Mpc).
    pub d_a_rec: f64,
    /// Photon damping scale at recombination (Mpc), `None` unless
    /// [`crate::config::ThermoConfig::compute_damping_scale`] is set.
    pub r_d_rec: Option<f64>,
    /// Free-streaming conformal time (Mpc).
    pub tau_fs: f64,
    /// Visibility-cut conformal time (Mpc).
    pub tau_cut: f64,
}

/// The frozen thermo table: rows in strictly increasing-z order (index 0 = today) plus the
/// scalar summary (§3).
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ThermoTable {
    /// Rows, one per grid point, index 0 = today.
    pub rows: Vec<ThermoRow>,
    /// Scalar summary quantities.
    pub summary: ThermoSummary,
}

impl ThermoTable {
    /// Redshift column, as a standalone slice (used to build [`crate::spline::Spline`]s in C7/C8).
    #[must_use]
    pub fn z_column(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.z).collect()
    }

    /// Conformal-time column.
    #[must_use]
    pub fn tau_column(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.tau).collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
