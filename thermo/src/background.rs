//! Background-cosmology collaborator contract (§6).
//!
//! The thermodynamics core never computes the Hubble rate or densities itself; it queries a
//! [`Background`] implementation, the same way the teacher crate this module is descended from
//! treats the PDF evolution kernel as a pure collaborator behind a trait boundary.

use crate::error::Result;

/// Controls which fields of [`BackgroundState`] a caller actually needs, so a cheap
/// implementation can skip work the caller doesn't use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DetailLevel {
    /// Only `hubble` and `scale_factor` are guaranteed to be populated.
    Short,
    /// `hubble`, `hubble_prime`, `scale_factor`, and the density fields are populated.
    Normal,
    /// Every field, including sound horizon and angular-diameter distance, is populated.
    Long,
}

/// A snapshot of background quantities at a given conformal time, as populated according to a
/// [`DetailLevel`]. Fields not requested by the detail level are left at `0.0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackgroundState {
    /// Conformal Hubble rate `H = a'/a` (1/Mpc).
    pub hubble: f64,
    /// Derivative of `hubble` with respect to conformal time (1/Mpc^2).
    pub hubble_prime: f64,
    /// Scale factor `a`, normalized to `a(today) = 1`.
    pub scale_factor: f64,
    /// Photon energy density (kg/m^3, or any consistent unit; only ratios are used).
    pub rho_gamma: f64,
    /// Baryon energy density, same units as `rho_gamma`.
    pub rho_b: f64,
    /// Cold dark matter energy density, same units as `rho_gamma`.
    pub rho_cdm: f64,
    /// Critical energy density today, same units as `rho_gamma`.
    pub rho_crit: f64,
    /// Radiation density parameter `Omega_r` at this epoch.
    pub omega_r: f64,
    /// Comoving sound horizon up to this time (Mpc). Only populated at [`DetailLevel::Long`].
    pub sound_horizon: f64,
    /// Angular diameter distance to this time (Mpc). Only populated at [`DetailLevel::Long`].
    pub angular_diameter_distance: f64,
    /// Conformal age corresponding to this time (Mpc).
    pub conformal_age: f64,
    /// Proper (cosmic) time corresponding to this conformal time (s).
    pub time: f64,
}

/// External background-cosmology collaborator (§6). Implementations are expected to be pure
/// functions of their internal, already-tabulated background solution; this crate treats them
/// as an opaque dependency and never mutates them during the compute phase.
pub trait Background {
    /// Conformal time `tau(z)` corresponding to redshift `z` (Mpc).
    fn tau_of_z(&self, z: f64) -> Result<f64>;

    /// Background state at conformal time `tau`, populated according to `detail`.
    fn at_tau(&self, tau: f64, detail: DetailLevel) -> Result<BackgroundState>;
}
