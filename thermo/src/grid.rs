//! Redshift grid builder (C1, §4.1).
//!
//! Produces the non-uniform sampling used by every downstream component: a linearly-spaced
//! reionization segment, a linearly-spaced recombination segment, and a log-spaced segment at
//! early times, concatenated in increasing-z order (today first) with conformal time attached
//! from the background collaborator.

use crate::background::{Background, DetailLevel};
use crate::config::GridParams;
use crate::error::{Error, Result};

/// Latest epoch at which helium recombination can plausibly still be underway; `z_initial` must
/// exceed this (§4.1).
const LATEST_HELIUM_RECOMBINATION_EPOCH: f64 = 5000.0;

/// The frozen redshift/conformal-time sampling produced by [`build`].
#[derive(Clone, Debug)]
pub struct Grid {
    /// Redshift at each grid point, strictly increasing (index 0 = today, z = 0).
    pub z: Vec<f64>,
    /// Conformal time at each grid point (Mpc), aligned with `z`; strictly decreasing.
    pub tau: Vec<f64>,
}

impl Grid {
    /// Number of points in the grid.
    #[must_use]
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// Whether the grid is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// The earliest conformal time in the grid, `tau_ini` (§4.1) — corresponds to `z_initial`,
    /// the last grid index (§3: index 0 = today, last index = `z_initial`).
    #[must_use]
    pub fn tau_ini(&self) -> f64 {
        *self.tau.last().expect("grid is never empty once built")
    }
}

/// Builds the three-segment grid described in §4.1 from `params`, querying conformal time from
/// `background` for every point.
///
/// # Errors
///
/// Returns [`Error::Domain`] if `params.z_initial` does not exceed
/// [`LATEST_HELIUM_RECOMBINATION_EPOCH`], or if the background collaborator fails a query.
pub fn build(params: &GridParams, background: &dyn Background) -> Result<Grid> {
    if params.z_initial <= LATEST_HELIUM_RECOMBINATION_EPOCH {
        return Err(Error::domain(format!(
            "z_initial = {} must exceed the latest helium-recombination epoch ({})",
            params.z_initial, LATEST_HELIUM_RECOMBINATION_EPOCH
        )));
    }
    if params.z_linear >= params.z_initial || params.reionization_z_start_max >= params.z_linear {
        return Err(Error::domain(
            "grid boundaries must satisfy reionization_z_start_max < z_linear < z_initial",
        ));
    }

    let log_segment = geometric_points(params.z_linear, params.z_initial, params.n_log);
    let linear_segment = linear_points(
        params.reionization_z_start_max,
        params.z_linear,
        params.n_lin,
    );
    let reio_segment = linear_points(0.0, params.reionization_z_start_max, params.n_reio);

    // concatenated so index 0 = today (z = 0) and the last index = z_initial (§3), without
    // double-counting the shared endpoints between adjacent segments
    let mut z = Vec::with_capacity(params.n_log + params.n_lin + params.n_reio);
    z.extend(reio_segment);
    z.extend(linear_segment.into_iter().skip(1));
    z.extend(log_segment.into_iter().skip(1));

    let mut tau = Vec::with_capacity(z.len());
    for &zi in &z {
        tau.push(background.tau_of_z(zi)?);
    }

    Ok(Grid { z, tau })
}

/// `n` geometrically-spaced points on `[lo, hi]`, increasing.
fn geometric_points(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![hi];
    }
    let log_lo = lo.ln();
    let log_hi = hi.ln();
    (0..n)
        .map(|i| {
            let t = crate::convert::f64_from_usize(i) / crate::convert::f64_from_usize(n - 1);
            (log_lo + t * (log_hi - log_lo)).exp()
        })
        .collect()
}

/// `n` linearly-spaced points on `[lo, hi]`, increasing.
fn linear_points(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![hi];
    }
    (0..n)
        .map(|i| {
            let t = crate::convert::f64_from_usize(i) / crate::convert::f64_from_usize(n - 1);
            lo + t * (hi - lo)
        })
        .collect()
}

/// Queries `detail_level` via the [`Background`] collaborator for every grid point, used by C5
/// and C7 when they need more than `tau`.
pub fn detail_at(
    grid: &Grid,
    background: &dyn Background,
    detail: DetailLevel,
) -> Result<Vec<crate::background::BackgroundState>> {
    grid.tau.iter().map(|&t| background.at_tau(t, detail)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundState;

    struct FlatBackground;

    impl Background for FlatBackground {
        fn tau_of_z(&self, z: f64) -> Result<f64> {
            Ok(1.0 / (1.0 + z))
        }
        fn at_tau(&self, tau: f64, _detail: DetailLevel) -> Result<BackgroundState> {
            Ok(BackgroundState {
                hubble: 1.0 / tau,
                ..Default::default()
            })
        }
    }

    #[test]
    fn rejects_too_low_z_initial() {
        let params = GridParams {
            z_initial: 4000.0,
            ..GridParams::default()
        };
        assert!(build(&params, &FlatBackground).is_err());
    }

    #[test]
    fn grid_is_strictly_increasing_in_z() {
        let params = GridParams::default();
        let grid = build(&params, &FlatBackground).unwrap();
        for w in grid.z.windows(2) {
            assert!(w[1] > w[0], "{} should exceed {}", w[1], w[0]);
        }
        assert_eq!(
            grid.len(),
            params.n_log + params.n_lin + params.n_reio - 2
        );
    }

    #[test]
    fn grid_endpoints_match_configured_boundaries() {
        let params = GridParams::default();
        let grid = build(&params, &FlatBackground).unwrap();
        assert!((grid.z[0] - 0.0).abs() < 1e-9);
        assert!((grid.z[grid.len() - 1] - params.z_initial).abs() < 1e-6);
    }
}
