//! Physical constants used throughout the recombination and reionization kernels.
//!
//! Values are SI unless noted; a handful of conversion factors carry their units in the name
//! (`MPC_OVER_M`) because the rest of the crate mixes SI and Mpc-based quantities freely, the
//! same way the background collaborator it queries does.

/// Speed of light (m/s).
pub const C: f64 = 2.997_924_58e8;
/// Thomson scattering cross section (m^2).
pub const SIGMA_T: f64 = 6.652_458_7321e-29;
/// Boltzmann constant (J/K).
pub const K_B: f64 = 1.380_649e-23;
/// Planck constant (J s).
pub const H_PLANCK: f64 = 6.626_070_15e-34;
/// Electron mass (kg).
pub const M_E: f64 = 9.109_383_7015e-31;
/// Hydrogen atom mass (kg).
pub const M_H: f64 = 1.673_575e-27;
/// Helium-4 atom mass (kg).
pub const M_HE: f64 = 6.646_479e-27;
/// Radiation constant `a = 4 sigma_SB / c` (J / m^3 / K^4).
pub const A_RAD: f64 = 7.565_723_4e-16;
/// One parsec in meters.
pub const PARSEC_OVER_M: f64 = 3.085_677_581_49e16;
/// One megaparsec in meters.
pub const MPC_OVER_M: f64 = PARSEC_OVER_M * 1.0e6;
/// Lyman-alpha energy of hydrogen divided by `k_B` (K), i.e. the hydrogen ionization
/// temperature scale used by the Saha equation.
pub const EI_H_OVER_KB: f64 = 157_800.0;
/// First helium ionization temperature scale (K).
pub const EI_HE1_OVER_KB: f64 = 285_335.0;
/// Second helium ionization temperature scale (K).
pub const EI_HE2_OVER_KB: f64 = 631_502.0;
/// 2s->1s two-photon decay rate of hydrogen (1/s).
pub const LYA_2S1S_H: f64 = 8.2245809;

/// Lower admissible bound for the primordial helium fraction.
pub const Y_HE_SMALL: f64 = 0.05;
/// Upper admissible bound for the primordial helium fraction.
pub const Y_HE_BIG: f64 = 0.8;

/// Redshift below which the recombination/reionization epoch is considered "recent" for the
/// purpose of validating the located recombination redshift.
pub const Z_REC_MIN: f64 = 500.0;
/// Redshift above which the located recombination redshift is considered unphysical.
pub const Z_REC_MAX: f64 = 3000.0;

/// Default hydrogen-recombination phase boundary (§9 open question: "phase boundary
/// constants"). Exposed as a tunable precision parameter in [`crate::config::PrecisionParams`]
/// rather than hard-coded at call sites.
pub const DEFAULT_Z_H_LIMIT: f64 = 1600.0;
/// Default second-helium-recombination phase boundary, see [`DEFAULT_Z_H_LIMIT`].
pub const DEFAULT_Z_HE2_LIMIT: f64 = 2870.0;
/// Default width of the smoothing overlap applied at every phase transition (§4.4).
pub const DEFAULT_TRANSITION_WIDTH: f64 = 50.0;
