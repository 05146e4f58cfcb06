//! Optical-depth shooting (C6, §4.6).
//!
//! Bisects the reionization midpoint redshift until the integrated optical depth to
//! reionization matches a user-supplied target. The pre-`reio` state ([`crate::evolver::run_to_reio`])
//! is computed once and cached; every bisection trial re-integrates only the `reio` phase via
//! [`crate::evolver::finish_reio`], instead of re-running the full `Brec..Frec` pipeline.

use crate::background::Background;
use crate::config::{ReioTarget, ThermoConfig};
use crate::energy_injection::EnergyInjection;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::reionization::ReionizationScheme;
use crate::spline::trapezoid;
use crate::table::ThermoRow;
use tracing::debug;

/// Computes the integrated optical depth to reionization, `∫ dκ/dτ dτ` from today up to the
/// reionization-start redshift (§4.6), by splining `dκ/dτ` against `τ` and integrating.
pub(crate) fn tau_reio_of_rows(rows: &[ThermoRow], z_reio_start: f64) -> f64 {
    let below: Vec<&ThermoRow> = rows.iter().filter(|r| r.z <= z_reio_start).collect();
    if below.len() < 2 {
        return 0.0;
    }
    let tau: Vec<f64> = below.iter().map(|r| r.tau).collect();
    let dkappa: Vec<f64> = below.iter().map(|r| r.dkappa).collect();
    trapezoid(&tau, &dkappa)
}

/// Re-integrates only the `reio` phase against the cached `pre` state, with `z_reio` substituted
/// for the scheme's midpoint, returning the resulting rows and residual `xe_before`.
fn run_with_trial_z_reio<B: Background, E: EnergyInjection>(
    pre: &crate::evolver::PreReioState,
    config: &ThermoConfig,
    grid: &Grid,
    background: &B,
    injection: &E,
    z_reio: f64,
) -> Result<(Vec<ThermoRow>, f64)> {
    let mut trial_config = config.clone();
    trial_config.reio_parametrization = substitute_z_reio(&config.reio_parametrization, z_reio)?;
    crate::evolver::finish_reio(pre, &trial_config, grid, background, injection)
}

/// Returns a copy of `scheme` with its midpoint redshift replaced by `z_reio`, for schemes that
/// have a well-defined single midpoint; other schemes cannot be shot on and are rejected at
/// [`ThermoConfig::validate`](crate::config::ThermoConfig::validate) time, before bisection ever
/// starts (§7 "domain violations are surfaced immediately").
fn substitute_z_reio(scheme: &ReionizationScheme, z_reio: f64) -> Result<ReionizationScheme> {
    match scheme {
        ReionizationScheme::Camb {
            delta_z,
            alpha,
            z_he,
            w_he,
            ..
        } => Ok(ReionizationScheme::Camb {
            z_reio,
            delta_z: *delta_z,
            alpha: *alpha,
            z_he: *z_he,
            w_he: *w_he,
        }),
        ReionizationScheme::HalfTanh { delta_z, .. } => Ok(ReionizationScheme::HalfTanh {
            z_reio,
            delta_z: *delta_z,
        }),
        _ => Err(Error::domain(
            "reio_z_or_tau = tau requires a single-midpoint reionization scheme (camb or half_tanh)",
        )),
    }
}

/// Bisects `z_reio` to match `target_tau` within `tol_tau` relative tolerance (§4.6).
///
/// # Errors
///
/// Returns [`Error::Convergence`] if the maximum iteration count is exceeded, or
/// [`Error::Domain`] if the configured scheme has no single midpoint to shoot on.
pub fn solve<B: Background, E: EnergyInjection>(
    config: &ThermoConfig,
    grid: &Grid,
    background: &B,
    injection: &E,
    y_he: f64,
) -> Result<(Vec<ThermoRow>, f64, f64)> {
    let target_tau = match config.reio_target {
        ReioTarget::OpticalDepth(tau) => tau,
        ReioTarget::Redshift(_) => {
            return Err(Error::domain(
                "shooting requires ReioTarget::OpticalDepth",
            ))
        }
    };

    let pre = crate::evolver::run_to_reio(config, grid, background, injection, y_he)?;

    // leave a margin below `reionization_z_start_max` for the transition smoothing, but never
    // more than half the available range, so a large `transition_width` relative to the grid's
    // reionization window can't collapse the bracket to a sliver near zero
    let margin = config
        .precision
        .transition_width
        .min(config.grid.reionization_z_start_max * 0.5);
    let mut lo = 0.0_f64;
    let mut hi = (config.grid.reionization_z_start_max - margin).max(1.0);

    let mut last_tau = f64::NAN;

    for iteration in 0..config.precision.max_bisection_iterations {
        let mid = 0.5 * (lo + hi);
        let (rows, _xe_before) = run_with_trial_z_reio(&pre, config, grid, background, injection, mid)?;
        let tau = tau_reio_of_rows(&rows, config.grid.reionization_z_start_max);

        debug!(iteration, lo, hi, mid, tau, target_tau, "bisection step");

        last_tau = tau;

        if (tau - target_tau).abs() < target_tau.max(1.0e-12) * config.precision.tol_tau {
            return Ok((rows, mid, tau));
        }
        if tau < target_tau {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo) < 1.0e-10 {
            return Ok((rows, mid, tau));
        }
    }

    Err(Error::convergence(format!(
        "tau_reio bisection did not converge within {} iterations (last tau = {last_tau})",
        config.precision.max_bisection_iterations,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_z_reio_rejects_unsupported_schemes() {
        let scheme = ReionizationScheme::None;
        assert!(substitute_z_reio(&scheme, 7.0).is_err());
    }

    #[test]
    fn substitute_z_reio_preserves_camb_widths() {
        let scheme = ReionizationScheme::Camb {
            z_reio: 1.0,
            delta_z: 0.5,
            alpha: 1.5,
            z_he: 3.5,
            w_he: 0.5,
        };
        let updated = substitute_z_reio(&scheme, 8.0).unwrap();
        match updated {
            ReionizationScheme::Camb { z_reio, delta_z, .. } => {
                assert!((z_reio - 8.0).abs() < 1e-12);
                assert!((delta_z - 0.5).abs() < 1e-12);
            }
            _ => panic!("expected Camb"),
        }
    }
}
