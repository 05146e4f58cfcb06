//! Reionization model (C2, §4.2).
//!
//! Each scheme is a pure function `(z) -> (X_e, dX_e/dz)`. Above the highest reionization
//! z-point, every scheme reduces to the residual `xe_before` handed off by the evolver at the
//! `frec -> reio` phase transition (§9 "xe_before back-channel") rather than reading it out of
//! shared state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One bin center `(z, xe)` for the [`ReionizationScheme::BinsTanh`] and
/// [`ReionizationScheme::ManyTanh`] schemes, and one knot `(z, xe)` for
/// [`ReionizationScheme::Inter`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ReioPoint {
    /// Redshift of this knot.
    pub z: f64,
    /// Free-electron-fraction level at this knot. For [`ReionizationScheme::ManyTanh`], `-1.0`
    /// and `-2.0` are sentinels expanding to the post-first- and post-second-helium-reionization
    /// levels; for [`ReionizationScheme::Inter`], `0.0` on the last knot is a sentinel meaning
    /// "whatever the recombination integrator produced".
    pub xe: f64,
}

/// Reionization parametrization (§4.2).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ReionizationScheme {
    /// No reionization; `X_e` stays at its residual value for all `z` in the reionization
    /// segment.
    None,
    /// Hydrogen tanh in `(1+z)^alpha`, plus a helium tanh centered at `z_he` of width `w_he`.
    Camb {
        /// Midpoint redshift of the hydrogen reionization transition.
        z_reio: f64,
        /// Width of the hydrogen transition, in redshift.
        delta_z: f64,
        /// Exponent of the `(1+z)` variable the hydrogen tanh is smooth in.
        alpha: f64,
        /// Midpoint redshift of the helium transition.
        z_he: f64,
        /// Width of the helium transition, in redshift.
        w_he: f64,
    },
    /// Half-amplitude variant of [`ReionizationScheme::Camb`]'s hydrogen term, linear in `z`
    /// rather than in `(1+z)^alpha`; no helium contribution. Derivative-discontinuity caveat:
    /// callers must use linear interpolation in C8 below `z < 2 * z_reio`.
    HalfTanh {
        /// Midpoint redshift of the transition.
        z_reio: f64,
        /// Width of the transition, in redshift.
        delta_z: f64,
    },
    /// Piecewise interpolation between bin centers via a tanh of sharpness `s` around each
    /// midpoint redshift; endpoints are extrapolated geometrically.
    BinsTanh {
        /// Bin centers, sorted by strictly decreasing `z`.
        bins: Vec<ReioPoint>,
        /// Sharpness of the tanh joining adjacent bins.
        sharpness: f64,
    },
    /// Superposition of independent tanh jumps, each of common width `w`, applied on top of the
    /// residual `xe_before`.
    ManyTanh {
        /// Jump centers, sorted by strictly decreasing `z`.
        jumps: Vec<ReioPoint>,
        /// Common width of every jump.
        width: f64,
    },
    /// Piecewise-linear interpolation through user knots; the first knot must be at `z = 0` and
    /// the last knot's `xe` must be the sentinel `0.0`. Callers must use linear interpolation in
    /// C8 below `z < 50`.
    Inter {
        /// Knots, sorted by strictly increasing `z`.
        knots: Vec<ReioPoint>,
    },
}

impl ReionizationScheme {
    /// Validates scheme-specific invariants (§7 domain violation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] on violation.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Camb { delta_z, w_he, .. } => {
                if *delta_z <= 0.0 || *w_he <= 0.0 {
                    return Err(Error::domain("camb reionization widths must be positive"));
                }
                Ok(())
            }
            Self::HalfTanh { delta_z, .. } => {
                if *delta_z <= 0.0 {
                    return Err(Error::domain("half_tanh width must be positive"));
                }
                Ok(())
            }
            Self::BinsTanh { bins, sharpness } => {
                if bins.len() < 2 {
                    return Err(Error::domain("bins_tanh needs at least two bins"));
                }
                if *sharpness <= 0.0 {
                    return Err(Error::domain("bins_tanh sharpness must be positive"));
                }
                Ok(())
            }
            Self::ManyTanh { jumps, width } => {
                if jumps.is_empty() {
                    return Err(Error::domain("many_tanh needs at least one jump"));
                }
                if *width <= 0.0 {
                    return Err(Error::domain("many_tanh width must be positive"));
                }
                Ok(())
            }
            Self::Inter { knots } => {
                if knots.len() < 2 {
                    return Err(Error::domain("inter needs at least two knots"));
                }
                if knots[0].z != 0.0 {
                    return Err(Error::domain("inter's first knot must be at z = 0"));
                }
                if knots[knots.len() - 1].xe != 0.0 {
                    return Err(Error::domain(
                        "inter's last knot must carry the sentinel xe = 0",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Whether C8 must use linear (rather than spline) interpolation below a scheme-specific
    /// threshold redshift, and that threshold.
    #[must_use]
    pub fn linear_interpolation_threshold(&self) -> Option<f64> {
        match self {
            Self::HalfTanh { z_reio, .. } => Some(2.0 * z_reio),
            Self::Inter { .. } => Some(50.0),
            _ => None,
        }
    }

    /// Evaluates `(X_e, dX_e/dz)` at `z`.
    ///
    /// `f_he` is the helium-to-hydrogen number ratio (glossary), used to expand the
    /// post-first-/post-second-helium-reionization sentinel levels. `xe_before` is the residual
    /// `X_e` handed off by the evolver at the `frec -> reio` transition (§9); reionization is
    /// additive on top of it.
    #[must_use]
    pub fn eval(&self, z: f64, f_he: f64, xe_before: f64) -> (f64, f64) {
        match self {
            Self::None => (xe_before, 0.0),
            Self::Camb {
                z_reio,
                delta_z,
                alpha,
                z_he,
                w_he,
            } => {
                let y = |zz: f64| (1.0 + zz).powf(*alpha);
                let y_prime = |zz: f64| alpha * (1.0 + zz).powf(alpha - 1.0);
                let dy = y_prime(*z_reio) * delta_z;

                let u_h = (y(*z_reio) - y(z)) / dy;
                let tanh_h = u_h.tanh();
                let du_h_dz = -y_prime(z) / dy;

                let xe_h = xe_before + (1.0 - xe_before) * 0.5 * (1.0 + tanh_h);
                let dxe_h_dz = (1.0 - xe_before) * 0.5 * (1.0 - tanh_h * tanh_h) * du_h_dz;

                let u_he = (z_he - z) / w_he;
                let tanh_he = u_he.tanh();
                let du_he_dz = -1.0 / w_he;

                let xe_he = f_he * 0.5 * (1.0 + tanh_he);
                let dxe_he_dz = f_he * 0.5 * (1.0 - tanh_he * tanh_he) * du_he_dz;

                (xe_h + xe_he, dxe_h_dz + dxe_he_dz)
            }
            Self::HalfTanh { z_reio, delta_z } => {
                let u = (z_reio - z) / delta_z;
                let tanh_u = u.tanh();
                let du_dz = -1.0 / delta_z;

                let xe = xe_before + (1.0 - xe_before) * 0.5 * (1.0 + tanh_u);
                let dxe_dz = (1.0 - xe_before) * 0.5 * (1.0 - tanh_u * tanh_u) * du_dz;
                (xe, dxe_dz)
            }
            Self::BinsTanh { bins, sharpness } => eval_bins_tanh(bins, *sharpness, z),
            Self::ManyTanh { jumps, width } => eval_many_tanh(jumps, *width, z, f_he, xe_before),
            Self::Inter { knots } => eval_inter(knots, z, xe_before),
        }
    }
}

fn eval_bins_tanh(bins: &[ReioPoint], sharpness: f64, z: f64) -> (f64, f64) {
    // bins sorted by strictly decreasing z; find the bracketing pair
    if z >= bins[0].z {
        // geometric extrapolation above the highest bin
        let ratio = bins[1].xe / bins[0].xe;
        let dz = bins[0].z - bins[1].z;
        let xe = bins[0].xe * ratio.powf((z - bins[0].z) / dz);
        let dxe_dz = xe * ratio.ln() / dz;
        return (xe, dxe_dz);
    }
    let last = bins.len() - 1;
    if z <= bins[last].z {
        let ratio = bins[last - 1].xe / bins[last].xe;
        let dz = bins[last - 1].z - bins[last].z;
        let xe = bins[last].xe * ratio.powf((bins[last].z - z) / dz);
        let dxe_dz = -xe * ratio.ln() / dz;
        return (xe, dxe_dz);
    }

    for w in bins.windows(2) {
        let (hi, lo) = (w[0], w[1]);
        if z <= hi.z && z >= lo.z {
            let mid = 0.5 * (hi.z + lo.z);
            let u = sharpness * (mid - z);
            let tanh_u = u.tanh();
            let du_dz = -sharpness;
            let xe = lo.xe + (hi.xe - lo.xe) * 0.5 * (1.0 + tanh_u);
            let dxe_dz = (hi.xe - lo.xe) * 0.5 * (1.0 - tanh_u * tanh_u) * du_dz;
            return (xe, dxe_dz);
        }
    }
    unreachable!("z must fall within, above, or below the bin range");
}

fn eval_many_tanh(jumps: &[ReioPoint], width: f64, z: f64, f_he: f64, xe_before: f64) -> (f64, f64) {
    let mut xe = xe_before;
    let mut dxe_dz = 0.0;
    let mut previous_level = xe_before;

    for jump in jumps {
        let level = match jump.xe {
            v if v == -1.0 => 1.0 + f_he,
            v if v == -2.0 => 1.0 + 2.0 * f_he,
            v => v,
        };
        let u = (jump.z - z) / width;
        let tanh_u = u.tanh();
        let du_dz = -1.0 / width;

        xe += (level - previous_level) * 0.5 * (1.0 + tanh_u);
        dxe_dz += (level - previous_level) * 0.5 * (1.0 - tanh_u * tanh_u) * du_dz;
        previous_level = level;
    }

    (xe, dxe_dz)
}

fn eval_inter(knots: &[ReioPoint], z: f64, xe_before: f64) -> (f64, f64) {
    let resolved = |p: &ReioPoint, is_last: bool| if is_last && p.xe == 0.0 { xe_before } else { p.xe };

    if z <= knots[0].z {
        return (resolved(&knots[0], false), 0.0);
    }
    let last = knots.len() - 1;
    if z >= knots[last].z {
        return (resolved(&knots[last], true), 0.0);
    }

    for (i, w) in knots.windows(2).enumerate() {
        let (lo, hi) = (w[0], w[1]);
        if z >= lo.z && z <= hi.z {
            let xe_lo = resolved(&lo, i == 0 && last == 0);
            let xe_hi = resolved(&hi, i + 1 == last);
            let slope = (xe_hi - xe_lo) / (hi.z - lo.z);
            return (xe_lo + slope * (z - lo.z), slope);
        }
    }
    unreachable!("z must fall within, above, or below the knot range");
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn camb_asymptotes_to_one_plus_f_he() {
        let scheme = ReionizationScheme::Camb {
            z_reio: 7.67,
            delta_z: 0.5,
            alpha: 1.5,
            z_he: 3.5,
            w_he: 0.5,
        };
        let f_he = 0.08;
        let (xe, _) = scheme.eval(0.0, f_he, 2.0e-4);
        assert_approx_eq!(f64, xe, 1.0 + f_he, epsilon = 1e-6);
    }

    #[test]
    fn camb_reduces_to_residual_far_above_reio() {
        let scheme = ReionizationScheme::Camb {
            z_reio: 7.67,
            delta_z: 0.5,
            alpha: 1.5,
            z_he: 3.5,
            w_he: 0.5,
        };
        let (xe, _) = scheme.eval(50.0, 0.08, 2.0e-4);
        assert_approx_eq!(f64, xe, 2.0e-4, epsilon = 1e-6);
    }

    #[test]
    fn many_tanh_two_jumps_match_scenario() {
        let scheme = ReionizationScheme::ManyTanh {
            jumps: vec![
                ReioPoint { z: 7.0, xe: -1.0 },
                ReioPoint { z: 3.5, xe: -2.0 },
            ],
            width: 0.5,
        };
        let f_he = 0.08;
        let (xe0, _) = scheme.eval(0.0, f_he, 2.0e-4);
        assert_approx_eq!(f64, xe0, 1.0 + 2.0 * f_he, epsilon = 1e-6);

        let (xe5, _) = scheme.eval(5.0, f_he, 2.0e-4);
        assert_approx_eq!(f64, xe5, 1.0 + f_he, epsilon = 1e-2);
    }

    #[test]
    fn inter_resolves_sentinel_last_level() {
        let scheme = ReionizationScheme::Inter {
            knots: vec![
                ReioPoint { z: 0.0, xe: 1.16 },
                ReioPoint { z: 20.0, xe: 0.0 },
            ],
        };
        let (xe, _) = scheme.eval(20.0, 0.08, 2.0e-4);
        assert_approx_eq!(f64, xe, 2.0e-4, epsilon = 1e-12);
    }

    #[test]
    fn validate_rejects_bad_inter() {
        let scheme = ReionizationScheme::Inter {
            knots: vec![ReioPoint { z: 1.0, xe: 1.0 }, ReioPoint { z: 2.0, xe: 0.0 }],
        };
        assert!(scheme.validate().is_err());
    }
}
