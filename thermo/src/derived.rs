//! Derived-quantity pass (C7, §4.7).
//!
//! Runs once every sample row has been filled by the evolver (C5) and, if requested, the
//! τ_reio shooting (C6). Splines `dκ/dτ` against conformal time to get its higher derivatives,
//! the survival probability, the visibility function and its derivatives, the drag time, the
//! variation rate, and locates the characteristic epochs (§3 "Scalars").

use crate::background::{Background, DetailLevel};
use crate::config::ThermoConfig;
use crate::constants::{Z_REC_MAX, Z_REC_MIN};
use crate::error::{Error, Result};
use crate::spline::{Cursor, Spline};
use crate::table::{ThermoRow, ThermoSummary, ThermoTable};

/// Threshold on `(1/(dκ/dτ))/τ` below which the free-streaming epoch is located (§4.7 step 7).
/// Not given a concrete value by §6's interface contract; chosen in the same order of magnitude
/// used by the teacher's other threshold-driven cutoffs.
const FREE_STREAMING_TRIGGER: f64 = 1.0e-3;
/// Fraction of peak visibility below which the visibility-cut time is located (§4.7 step 8).
const VISIBILITY_CUT_THRESHOLD: f64 = 1.0e-4;

/// Runs the full derived-quantity pass over `rows` (already filled with `z`, `tau`, `x_e`,
/// `dkappa`, `t_b`, `cb2` by the evolver), producing the frozen [`ThermoTable`].
///
/// # Errors
///
/// Returns [`Error::Domain`] if fewer than three rows are supplied, or if the located
/// recombination redshift falls outside `(Z_REC_MIN, Z_REC_MAX)` (§8).
pub fn run<B: Background>(config: &ThermoConfig, background: &B, mut rows: Vec<ThermoRow>) -> Result<ThermoTable> {
    if rows.len() < 3 {
        return Err(Error::domain("derived-quantity pass needs at least 3 rows"));
    }

    let tau: Vec<f64> = rows.iter().map(|r| r.tau).collect();
    let dkappa: Vec<f64> = rows.iter().map(|r| r.dkappa).collect();

    let kappa_spline = Spline::fit(&tau, &dkappa)?;
    let minus_kappa = kappa_spline.cumulative_integral();

    for (i, row) in rows.iter_mut().enumerate() {
        let (ddkappa, _) = kappa_spline.eval_prime(row.tau, Cursor::CloseBy(i));
        let (dddkappa, _) = kappa_spline.eval_second(row.tau, Cursor::CloseBy(i));
        row.ddkappa = ddkappa;
        row.dddkappa = dddkappa;
        row.exp_minus_kappa = minus_kappa[i].exp().min(1.0);
        row.g = row.dkappa * row.exp_minus_kappa;
        row.dg = (ddkappa + row.dkappa * row.dkappa) * row.exp_minus_kappa;
        row.ddg = (dddkappa + 3.0 * row.dkappa * ddkappa + row.dkappa.powi(3)) * row.exp_minus_kappa;
    }

    // step 4: variation rate, smoothed
    let raw_rate: Vec<f64> = rows
        .iter()
        .map(|r| {
            let a = r.dkappa * r.dkappa;
            let b = if r.dkappa != 0.0 {
                (r.ddkappa / r.dkappa).powi(2)
            } else {
                0.0
            };
            let c = if r.dkappa != 0.0 {
                (r.dddkappa / r.dkappa).abs()
            } else {
                0.0
            };
            (a + b + c).sqrt()
        })
        .collect();
    let smoothed_rate = crate::spline::boxcar_smooth(&raw_rate, config.precision.rate_smoothing_radius);
    for (row, rate) in rows.iter_mut().zip(smoothed_rate) {
        row.rate = rate;
    }

    // step 1: drag time, tau_d(tau) = -integral_{tau_today}^{tau} (1/R) dkappa dtau
    let r_of_tau = r_coefficients(background, &tau)?;
    let drag_integrand: Vec<f64> = dkappa.iter().zip(&r_of_tau).map(|(&dk, &r)| dk / r).collect();
    let drag_spline = Spline::fit(&tau, &drag_integrand)?;
    let drag_cumulative = drag_spline.cumulative_integral();
    for (row, &c) in rows.iter_mut().zip(&drag_cumulative) {
        row.tau_d = -c;
    }

    // optional: damping scale (§4.7 step 2)
    if config.compute_damping_scale {
        compute_damping_scale(&mut rows, &r_of_tau, &tau)?;
    }

    // optional: cb2 derivatives
    if config.compute_cb2_derivatives {
        let cb2: Vec<f64> = rows.iter().map(|r| r.cb2).collect();
        let cb2_spline = Spline::fit(&tau, &cb2)?;
        for (i, row) in rows.iter_mut().enumerate() {
            let (dcb2, _) = cb2_spline.eval_prime(row.tau, Cursor::CloseBy(i));
            let (ddcb2, _) = cb2_spline.eval_second(row.tau, Cursor::CloseBy(i));
            row.dcb2 = Some(dcb2);
            row.ddcb2 = Some(ddcb2);
        }
    }

    let summary = locate_epochs(config, background, &rows)?;

    Ok(ThermoTable { rows, summary })
}

/// `R = (3/4) rho_b / rho_gamma` at each sample, queried from the background collaborator.
fn r_coefficients<B: Background>(background: &B, tau: &[f64]) -> Result<Vec<f64>> {
    tau.iter()
        .map(|&t| {
            let bg = background.at_tau(t, DetailLevel::Normal)?;
            if bg.rho_gamma <= 0.0 {
                return Err(Error::guard("rho_gamma must be positive to form R = 3 rho_b / 4 rho_gamma"));
            }
            Ok(0.75 * bg.rho_b / bg.rho_gamma)
        })
        .collect()
}

/// Comoving photon damping scale, §4.7 step 2. The boundary term accounts analytically for the
/// radiation-dominated limit (`R -> 0`) where the integrand diverges as `1/(dκ/dτ)`.
fn compute_damping_scale(rows: &mut [ThermoRow], r_of_tau: &[f64], tau: &[f64]) -> Result<()> {
    let integrand: Vec<f64> = rows
        .iter()
        .zip(r_of_tau)
        .map(|(row, &r)| {
            if row.dkappa <= 0.0 {
                0.0
            } else {
                (1.0 / row.dkappa) * ((r * r / (1.0 + r) + 16.0 / 15.0) / (1.0 + r)) / 6.0
            }
        })
        .collect();
    let spline = Spline::fit(tau, &integrand)?;
    let cumulative = spline.cumulative_integral();

    let tau_ini = tau.last().copied().unwrap_or(0.0);
    let dkappa_ini = rows.last().map(|r| r.dkappa).unwrap_or(1.0);
    let boundary = if dkappa_ini > 0.0 {
        tau_ini / (3.0 * dkappa_ini) * (16.0 / (15.0 * 6.0 * 3.0))
    } else {
        0.0
    };

    let cumulative_total = cumulative.last().copied().unwrap_or(0.0);
    for (row, &c) in rows.iter_mut().zip(&cumulative) {
        let total = boundary + (c - cumulative_total);
        row.r_d = Some(((2.0 * std::f64::consts::PI).powi(2) * total.max(0.0)).sqrt());
    }
    Ok(())
}

/// Locates `z_rec`, `z_d`, the free-streaming time, and the visibility-cut time (§4.7 steps
/// 5-8), queries the background collaborator for the sound horizon and angular diameter
/// distance at those epochs, and copies the `τ_reio`/`z_reio` scalars computed upstream into the
/// summary.
fn locate_epochs<B: Background>(config: &ThermoConfig, background: &B, rows: &[ThermoRow]) -> Result<ThermoSummary> {
    let (peak_index, _) = rows
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.g.partial_cmp(&b.g).unwrap())
        .ok_or_else(|| Error::domain("no rows to locate recombination epoch in"))?;

    let z_rec = refine_peak_z(rows, peak_index);
    if !(Z_REC_MIN..=Z_REC_MAX).contains(&z_rec) {
        return Err(Error::domain(format!(
            "recombination redshift z_rec = {z_rec} outside the physical range ({Z_REC_MIN}, {Z_REC_MAX})"
        )));
    }

    let z_d = locate_drag_epoch(rows);

    let z_reio = match config.reio_target {
        crate::config::ReioTarget::Redshift(z) => z,
        crate::config::ReioTarget::OpticalDepth(_) => 0.0, // overwritten by the caller after shooting
    };
    let tau_reio = 0.0; // overwritten by the caller when shooting was used

    let tau_fs = locate_free_streaming_time(rows, peak_index);
    let tau_cut = locate_visibility_cut_time(rows);

    let tau_rec = tau_of_z(rows, z_rec);
    let tau_d_epoch = tau_of_z(rows, z_d);
    let state_rec = background.at_tau(tau_rec, DetailLevel::Long)?;
    let state_d = background.at_tau(tau_d_epoch, DetailLevel::Long)?;

    Ok(ThermoSummary {
        z_rec,
        z_d,
        z_reio,
        tau_reio,
        r_s_rec: state_rec.sound_horizon,
        r_s_d: state_d.sound_horizon,
        d_a_rec: state_rec.angular_diameter_distance,
        r_d_rec: rows.get(peak_index).and_then(|r| r.r_d),
        tau_fs,
        tau_cut,
    })
}

/// Linearly interpolates `tau` at `z` from the bracketing rows (ascending-z, descending-tau; §3).
fn tau_of_z(rows: &[ThermoRow], z: f64) -> f64 {
    if z <= rows[0].z {
        return rows[0].tau;
    }
    let last = rows.len() - 1;
    if z >= rows[last].z {
        return rows[last].tau;
    }
    for w in rows.windows(2) {
        if z >= w[0].z && z <= w[1].z {
            let t = (z - w[0].z) / (w[1].z - w[0].z);
            return w[0].tau + t * (w[1].tau - w[0].tau);
        }
    }
    rows[last].tau
}

/// Three-point quadratic vertex refinement of the peak location (§4.7 step 5), generalized to a
/// non-uniform grid (the source's formula assumes uniform z-spacing; the vertex formula below
/// reduces to it in that limit).
fn refine_peak_z(rows: &[ThermoRow], peak_index: usize) -> f64 {
    if peak_index == 0 || peak_index + 1 >= rows.len() {
        return rows[peak_index].z;
    }
    let (z0, z1, z2) = (rows[peak_index - 1].z, rows[peak_index].z, rows[peak_index + 1].z);
    let (g0, g1, g2) = (rows[peak_index - 1].g, rows[peak_index].g, rows[peak_index + 1].g);

    // Lagrange-basis vertex of the quadratic through the three (possibly non-uniformly spaced)
    // points, via the derivative of the interpolating polynomial set to zero.
    let denom = (z0 - z1) * (z0 - z2) * (z1 - z2);
    if denom.abs() < 1.0e-300 {
        return z1;
    }
    let a = (z2 * (g1 - g0) + z1 * (g0 - g2) + z0 * (g2 - g1)) / denom;
    let b = (z2 * z2 * (g0 - g1) + z1 * z1 * (g2 - g0) + z0 * z0 * (g1 - g2)) / denom;
    if a.abs() < 1.0e-300 {
        return z1;
    }
    let vertex = -b / (2.0 * a);
    if vertex.is_finite() && vertex > z0.min(z2) && vertex < z0.max(z2) {
        vertex
    } else {
        z1
    }
}

/// Smallest `z` (moving from `z = 0` outward) where `tau_d >= 1`, by linear interpolation
/// between bracketing samples (§4.7 step 6). Rows are in ascending-z order (§3).
fn locate_drag_epoch(rows: &[ThermoRow]) -> f64 {
    for w in rows.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        if lo.tau_d < 1.0 && hi.tau_d >= 1.0 {
            let t = (1.0 - lo.tau_d) / (hi.tau_d - lo.tau_d);
            return lo.z + t * (hi.z - lo.z);
        }
    }
    rows.last().map_or(0.0, |r| r.z)
}

/// First conformal time, moving back (to larger z) from the recombination peak, where
/// `(1/(dκ/dτ))/τ` drops below [`FREE_STREAMING_TRIGGER`] (§4.7 step 7).
fn locate_free_streaming_time(rows: &[ThermoRow], peak_index: usize) -> f64 {
    for row in rows.iter().skip(peak_index) {
        if row.dkappa > 0.0 && row.tau > 0.0 && (1.0 / row.dkappa) / row.tau < FREE_STREAMING_TRIGGER {
            return row.tau;
        }
    }
    rows.last().map_or(0.0, |r| r.tau)
}

/// Largest conformal time where `g < g_max * `[`VISIBILITY_CUT_THRESHOLD`] (§4.7 step 8). Rows
/// are in ascending-z order, so ascending `tau` corresponds to descending index.
fn locate_visibility_cut_time(rows: &[ThermoRow]) -> f64 {
    let g_max = rows.iter().map(|r| r.g).fold(0.0_f64, f64::max);
    let threshold = g_max * VISIBILITY_CUT_THRESHOLD;
    rows.iter()
        .filter(|r| r.g < threshold)
        .map(|r| r.tau)
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundState;
    use crate::config::{GridParams, PrecisionParams, ReioTarget, RecombinationEngine, YHeSource};
    use crate::reionization::ReionizationScheme;

    struct FlatBackground;

    impl Background for FlatBackground {
        fn tau_of_z(&self, z: f64) -> Result<f64> {
            Ok(1.0e4 / (1.0 + z))
        }
        fn at_tau(&self, tau: f64, _detail: DetailLevel) -> Result<BackgroundState> {
            Ok(BackgroundState {
                hubble: 1.0 / tau,
                rho_gamma: 1.0,
                rho_b: 0.1,
                ..Default::default()
            })
        }
    }

    fn make_rows(n: usize) -> Vec<ThermoRow> {
        (0..n)
            .map(|i| {
                let z = crate::convert::f64_from_usize(i) * 100.0;
                let tau = 1.0e4 / (1.0 + z);
                // a synthetic dkappa profile peaking around mid-table, like recombination
                let center = crate::convert::f64_from_usize(n) * 50.0;
                let dkappa = 1.0 + 100.0 * (-((z - center) / 50.0).powi(2)).exp();
                ThermoRow {
                    z,
                    tau,
                    x_e: 1.0,
                    dkappa,
                    t_b: 2.7255 * (1.0 + z),
                    cb2: 1.0e-9,
                    ..ThermoRow::default()
                }
            })
            .collect()
    }

    fn config() -> ThermoConfig {
        ThermoConfig {
            t_cmb: 2.7255,
            omega_b_h2: 0.0224,
            y_he: YHeSource::Fixed(0.2454),
            n_eff: 3.046,
            recombination: RecombinationEngine::R,
            reio_parametrization: ReionizationScheme::None,
            reio_target: ReioTarget::Redshift(0.0),
            compute_damping_scale: false,
            compute_cb2_derivatives: false,
            grid: GridParams::default(),
            precision: PrecisionParams::default(),
        }
    }

    #[test]
    fn derived_pass_fills_visibility_columns() {
        let rows = make_rows(40);
        let table = run(&config(), &FlatBackground, rows).unwrap();
        assert!(table.rows.iter().any(|r| r.g > 0.0));
        for r in &table.rows {
            assert!((0.0..=1.0).contains(&r.exp_minus_kappa));
        }
    }

    #[test]
    fn rejects_recombination_outside_physical_range() {
        // a flat dkappa never produces a localized peak inside (Z_REC_MIN, Z_REC_MAX)
        let rows: Vec<ThermoRow> = (0..40)
            .map(|i| {
                let z = crate::convert::f64_from_usize(i) * 10.0;
                ThermoRow {
                    z,
                    tau: 1.0e4 / (1.0 + z),
                    x_e: 1.0,
                    dkappa: 1.0,
                    t_b: 2.7255 * (1.0 + z),
                    cb2: 1.0e-9,
                    ..ThermoRow::default()
                }
            })
            .collect();
        assert!(run(&config(), &FlatBackground, rows).is_err());
    }
}
