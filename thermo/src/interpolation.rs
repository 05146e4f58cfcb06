//! Interpolation service (C8, §4.8).
//!
//! The only reader of a frozen [`ThermoTable`] once the compute phase has finished. Dispatches
//! each query to asymptotic extrapolation above `z_initial`, linear interpolation near a
//! reionization-scheme derivative discontinuity, or cubic-spline interpolation otherwise.

use crate::background::{Background, DetailLevel};
use crate::config::ThermoConfig;
use crate::error::Result;
use crate::reionization::ReionizationScheme;
use crate::spline::{Cursor as SplineCursor, Spline};
use crate::table::{ThermoRow, ThermoTable};

/// Cursor mode requested by the caller (§6 `at_z`), mirroring [`SplineCursor`] but exposed at
/// the public query boundary under its own name per §9's "avoid string tags... at API
/// boundaries".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryCursor {
    /// Search the whole table from scratch.
    Normal,
    /// Resume from a previously returned index, for monotone sweeps.
    CloseBy(usize),
}

impl From<QueryCursor> for SplineCursor {
    fn from(c: QueryCursor) -> Self {
        match c {
            QueryCursor::Normal => Self::Normal,
            QueryCursor::CloseBy(i) => Self::CloseBy(i),
        }
    }
}

/// Splined representation of every frozen table column, built once and reused by every query
/// (§5: queries are read-only and may run from multiple threads in parallel).
pub struct InterpolationService {
    z: Vec<f64>,
    x_e: Spline,
    dkappa: Spline,
    ddkappa: Spline,
    dddkappa: Spline,
    exp_minus_kappa: Spline,
    g: Spline,
    dg: Spline,
    ddg: Spline,
    t_b: Spline,
    cb2: Spline,
    tau_d: Spline,
    rate: Spline,
    linear_threshold: Option<f64>,
    z_initial: f64,
    t_cmb: f64,
}

impl InterpolationService {
    /// Builds splines of every table column against `z` (§4.8 step 9), and records the
    /// scheme-specific linear-interpolation threshold, if any (§4.2).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`](crate::error::Error::Domain) if the table has fewer than two
    /// rows.
    pub fn build(table: &ThermoTable, reio_parametrization: &ReionizationScheme, t_cmb: f64) -> Result<Self> {
        let z = table.z_column();
        let col = |f: fn(&ThermoRow) -> f64| -> Vec<f64> { table.rows.iter().map(f).collect() };

        Ok(Self {
            z_initial: *z.last().unwrap_or(&0.0),
            x_e: Spline::fit(&z, &col(|r| r.x_e))?,
            dkappa: Spline::fit(&z, &col(|r| r.dkappa))?,
            ddkappa: Spline::fit(&z, &col(|r| r.ddkappa))?,
            dddkappa: Spline::fit(&z, &col(|r| r.dddkappa))?,
            exp_minus_kappa: Spline::fit(&z, &col(|r| r.exp_minus_kappa))?,
            g: Spline::fit(&z, &col(|r| r.g))?,
            dg: Spline::fit(&z, &col(|r| r.dg))?,
            ddg: Spline::fit(&z, &col(|r| r.ddg))?,
            t_b: Spline::fit(&z, &col(|r| r.t_b))?,
            cb2: Spline::fit(&z, &col(|r| r.cb2))?,
            tau_d: Spline::fit(&z, &col(|r| r.tau_d))?,
            rate: Spline::fit(&z, &col(|r| r.rate))?,
            linear_threshold: reio_parametrization.linear_interpolation_threshold(),
            z,
            t_cmb,
        })
    }

    /// Evaluates the table at `z`, dispatching per §4.8, returning the row and the index to pass
    /// back as the next call's [`QueryCursor::CloseBy`] hint.
    #[must_use]
    pub fn at_z<B: Background>(&self, z: f64, background: &B, cursor: QueryCursor) -> Result<(ThermoRow, usize)> {
        if z > self.z_initial {
            return Ok((self.extrapolate(z, background)?, 0));
        }

        let use_linear = self.linear_threshold.is_some_and(|t| z < t);
        let sc: SplineCursor = cursor.into();

        let (x_e, _) = self.eval_dispatch(&self.x_e, z, sc, use_linear);
        let (dkappa, idx) = self.eval_dispatch(&self.dkappa, z, sc, use_linear);
        let (ddkappa, _) = self.eval_dispatch(&self.ddkappa, z, sc, use_linear);
        let (dddkappa, _) = self.eval_dispatch(&self.dddkappa, z, sc, use_linear);
        let (exp_minus_kappa, _) = self.eval_dispatch(&self.exp_minus_kappa, z, sc, use_linear);
        let (g, _) = self.eval_dispatch(&self.g, z, sc, use_linear);
        let (dg, _) = self.eval_dispatch(&self.dg, z, sc, use_linear);
        let (ddg, _) = self.eval_dispatch(&self.ddg, z, sc, use_linear);
        let (t_b, _) = self.eval_dispatch(&self.t_b, z, sc, use_linear);
        let (cb2, _) = self.eval_dispatch(&self.cb2, z, sc, use_linear);
        let (tau_d, _) = self.eval_dispatch(&self.tau_d, z, sc, use_linear);
        let (rate, _) = self.eval_dispatch(&self.rate, z, sc, use_linear);

        let tau = background.tau_of_z(z)?;

        Ok((
            ThermoRow {
                z,
                tau,
                x_e,
                dkappa,
                ddkappa,
                dddkappa,
                exp_minus_kappa,
                g,
                dg,
                ddg,
                t_b,
                cb2,
                tau_d,
                r_d: None,
                dcb2: None,
                ddcb2: None,
                rate,
            },
            idx,
        ))
    }

    /// Evaluates `spline` at `z`, using linear (secant) interpolation instead of the cubic fit
    /// when `use_linear` is set (§4.2's derivative-discontinuity caveat).
    fn eval_dispatch(&self, spline: &Spline, z: f64, cursor: SplineCursor, use_linear: bool) -> (f64, usize) {
        if use_linear {
            spline.eval_linear(z, cursor)
        } else {
            spline.eval(z, cursor)
        }
    }

    /// Asymptotic extrapolation above `z_initial` (§4.8).
    fn extrapolate<B: Background>(&self, z: f64, background: &B) -> Result<ThermoRow> {
        let tau = background.tau_of_z(z)?;
        let bg = background.at_tau(tau, DetailLevel::Normal)?;

        let (last_z, last) = (
            *self.z.last().unwrap(),
            self.row_at_last(),
        );
        let ratio = (1.0 + z) / (1.0 + last_z);

        let dkappa = last.dkappa * ratio * ratio;
        let tau_d = last.tau_d * ratio * ratio;
        let ddkappa = -bg.hubble * 2.0 / (1.0 + z) * dkappa;
        let dddkappa = (bg.hubble * bg.hubble / (1.0 + z) - bg.hubble_prime) * 2.0 / (1.0 + z) * dkappa;

        Ok(ThermoRow {
            z,
            tau,
            x_e: last.x_e,
            dkappa,
            ddkappa,
            dddkappa,
            exp_minus_kappa: 0.0,
            g: 0.0,
            dg: 0.0,
            ddg: 0.0,
            t_b: self.t_cmb * (1.0 + z),
            cb2: last.cb2 * ratio,
            tau_d,
            r_d: last.r_d.map(|r| r * ratio.powf(-1.5)),
            dcb2: None,
            ddcb2: None,
            rate: dkappa,
        })
    }

    fn row_at_last(&self) -> ThermoRowSnapshot {
        let i = self.z.len() - 1;
        ThermoRowSnapshot {
            dkappa: self.dkappa.eval(self.z[i], SplineCursor::CloseBy(i)).0,
            tau_d: self.tau_d.eval(self.z[i], SplineCursor::CloseBy(i)).0,
            cb2: self.cb2.eval(self.z[i], SplineCursor::CloseBy(i)).0,
            x_e: self.x_e.eval(self.z[i], SplineCursor::CloseBy(i)).0,
            r_d: None,
        }
    }
}

/// The handful of last-row values the extrapolation formulas need (§4.8), queried directly from
/// the splines rather than retaining the whole [`ThermoTable`].
struct ThermoRowSnapshot {
    dkappa: f64,
    tau_d: f64,
    cb2: f64,
    x_e: f64,
    r_d: Option<f64>,
}
