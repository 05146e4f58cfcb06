//! Stiff evolver driver (C5, §4.5).
//!
//! Drives an in-crate implicit BDF-style corrector, solved by a fixed-iteration-count Newton
//! scheme with step-doubling local error estimation, across the phase intervals scheduled by
//! C4. The derivative function wraps [`crate::recombination::EngineR`]; the sample sink
//! reconstructs each requested row and applies the cross-phase smoothing of §4.4.

use crate::background::{Background, DetailLevel};
use crate::config::{PrecisionParams, RecombinationEngine, ThermoConfig};
use crate::constants::{C, M_H, MPC_OVER_M, SIGMA_T};
use crate::energy_injection::EnergyInjection;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::recombination::{
    compton_coupling_r_g, saha_h, saha_he1, saha_he2, EngineH, EngineR, HeliumSwitch,
    KernelContext, ReferenceKernel, RecombState,
};
use crate::scheduler::{blend_across_transition, Phase, PhaseBoundaries};
use crate::table::ThermoRow;
use tracing::debug;

/// State vector integrated by the solver: `T_mat`, `x_H`, `x_He`, in that fixed order regardless
/// of which are actively driven by the ODE in the current phase (§4.4); inactive slots are not
/// perturbed by the corrector but are re-derived from their Saha formula at every sampled `z`
/// by [`reconstruct_inactive`] rather than carried at a single frozen value.
type StateVec = [f64; 3];

/// Options controlling the in-crate implicit solver (§4.5).
#[derive(Clone, Copy, Debug)]
pub struct SolverOptions {
    /// Local-error tolerance driving step-size adaptation.
    pub tolerance: f64,
    /// Fixed number of Newton corrector iterations per step.
    pub newton_iterations: usize,
    /// Maximum number of step-halvings attempted before giving up on a single step.
    pub max_halvings: usize,
}

/// Derivative of `state` at `mz = -z` (the evolver's time variable), plus the sample-relevant
/// scalars the sink needs so it doesn't have to re-derive them (`x_e`, `hubble`).
struct StepContext<'a, B: Background, E: EnergyInjection> {
    background: &'a B,
    injection: &'a E,
    engine: EngineR,
    recombination: RecombinationEngine,
    t_cmb: f64,
    f_he: f64,
    n_h_today: f64,
    r_g: f64,
    precision: &'a PrecisionParams,
    active: crate::scheduler::ActiveVars,
}

impl<'a, B: Background, E: EnergyInjection> StepContext<'a, B, E> {
    fn kernel_context(&self, z: f64) -> Result<KernelContext> {
        let tau = self.background.tau_of_z(z)?;
        let bg = self.background.at_tau(tau, DetailLevel::Normal)?;
        let hubble_proper = bg.hubble * C / MPC_OVER_M;
        let n_h = self.n_h_today * (1.0 + z).powi(3);
        Ok(KernelContext {
            z,
            hubble: hubble_proper,
            dlnh_dz: bg.hubble_prime / (bg.hubble * bg.hubble) * (-bg.hubble),
            t_rad: self.t_cmb * (1.0 + z),
            n_h,
            f_he: self.f_he,
            energy_rate: self.injection.on_the_spot_rate(z),
        })
    }

    /// Derivative of `state` w.r.t. `-z`, i.e. `d state / d(mz)` where `mz = -z`.
    fn derivative(&self, mz: f64, state: &StateVec) -> Result<StateVec> {
        let z = -mz;
        let ctx = self.kernel_context(z)?;
        let recomb = RecombState {
            t_mat: state[0],
            x_h: state[1],
            x_he: state[2],
        };

        let (d_x_h, d_x_he) = if self.active.x_h || self.active.x_he {
            match self.recombination {
                RecombinationEngine::R => self.engine.ionization_derivatives(&recomb, &ctx),
                RecombinationEngine::H => {
                    // engine H only replaces the hydrogen equation; helium stays on engine R's
                    // Saha-driven path in both engines (§4.3)
                    let kernel = ReferenceKernel {
                        n_h_today: self.n_h_today,
                        peebles_trigger: self.precision.peebles_trigger,
                    };
                    let (_, d_x_h) = EngineH::new(&kernel).ionization_derivative(&ctx, state[0]);
                    let (_, d_x_he) = self.engine.ionization_derivatives(&recomb, &ctx);
                    (d_x_h, d_x_he)
                }
            }
        } else {
            (0.0, 0.0)
        };

        let x = recomb.x_e(self.f_he);
        let dlnx_dz = if x > 0.0 { (d_x_h + d_x_he) / x } else { 0.0 };
        let d_t_mat = self.engine.matter_temperature_derivative(
            &recomb,
            &ctx,
            dlnx_dz,
            self.t_cmb * (1.0 + z),
            self.r_g,
            self.precision.tight_coupling_trigger,
        );

        // derivative w.r.t. mz = -z is the negative of the derivative w.r.t. z (§4.5)
        Ok([-d_t_mat, -d_x_h, -d_x_he])
    }
}

fn add(a: &StateVec, b: &StateVec, scale: f64) -> StateVec {
    [a[0] + scale * b[0], a[1] + scale * b[1], a[2] + scale * b[2]]
}

fn max_abs_diff(a: &StateVec, b: &StateVec) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

/// One implicit trapezoidal-corrector step from `(t, y)` to `t + h`, refined by
/// `newton_iterations` fixed-point Newton-style corrector passes.
fn implicit_step<B: Background, E: EnergyInjection>(
    ctx: &StepContext<B, E>,
    t: f64,
    y: &StateVec,
    h: f64,
    newton_iterations: usize,
) -> Result<StateVec> {
    let f0 = ctx.derivative(t, y)?;
    // predictor: explicit Euler
    let mut y_next = add(y, &f0, h);
    for _ in 0..newton_iterations {
        let f1 = ctx.derivative(t + h, &y_next)?;
        y_next = add(y, &add(&f0, &f1, 1.0), 0.5 * h);
    }
    Ok(y_next)
}

/// Advances from `(t, y)` to `t + h` using step-doubling: one step of size `h` against two of
/// size `h/2`, halving `h` until the discrepancy is within `options.tolerance` or the halving
/// budget is exhausted.
fn adaptive_step<B: Background, E: EnergyInjection>(
    ctx: &StepContext<B, E>,
    t: f64,
    y: &StateVec,
    h: f64,
    options: &SolverOptions,
) -> Result<(StateVec, f64)> {
    let mut step = h;
    for _ in 0..=options.max_halvings {
        let full = implicit_step(ctx, t, y, step, options.newton_iterations)?;
        let half1 = implicit_step(ctx, t, y, step / 2.0, options.newton_iterations)?;
        let half2 = implicit_step(ctx, t + step / 2.0, &half1, step / 2.0, options.newton_iterations)?;
        let error = max_abs_diff(&full, &half2);
        let scale = half2.iter().fold(1.0_f64, |m, &v| m.max(v.abs()));
        if error <= options.tolerance * scale.max(1.0) {
            return Ok((half2, step));
        }
        step /= 2.0;
    }
    Err(Error::convergence(format!(
        "step-doubling failed to converge after {} halvings at t = {t}",
        options.max_halvings
    )))
}

/// Integrates from `mz_start` to `mz_end` (inclusive), invoking `sink` at each grid point in
/// `sample_points` that falls in the interval, honoring the cross-phase blend of §4.4.
#[allow(clippy::too_many_arguments)]
fn integrate_interval<B: Background, E: EnergyInjection>(
    ctx: &StepContext<B, E>,
    phase: Phase,
    mz_start: f64,
    mz_end: f64,
    mut y: StateVec,
    sample_points: &[f64],
    transition_width: f64,
    previous_phase_row: Option<&StateVec>,
    options: &SolverOptions,
    rows: &mut Vec<(f64, StateVec)>,
) -> Result<StateVec> {
    let mut t = mz_start;
    let initial_step = ((mz_end - mz_start) / 50.0).max(1.0e-8);
    let mut h = initial_step;

    let points_in_interval: Vec<f64> = sample_points
        .iter()
        .copied()
        .filter(|&mz| mz > mz_start - 1.0e-12 && mz <= mz_end + 1.0e-12)
        .collect();
    let mut next_sample_idx = 0usize;

    while t < mz_end - 1.0e-12 {
        let step = h.min(mz_end - t);
        let (y_next, used_step) = adaptive_step(ctx, t, &y, step, options)?;
        t += used_step;
        y = y_next;
        h = (used_step * 1.5).min(initial_step * 4.0);

        while next_sample_idx < points_in_interval.len()
            && points_in_interval[next_sample_idx] <= t + 1.0e-9
        {
            let mz_sample = points_in_interval[next_sample_idx];
            let z_sample = -mz_sample;
            let z_transition = -mz_start;
            // inactive components track Saha equilibrium throughout the phase, not just at
            // phase entry, so they must be re-evaluated at this sample's z (§4.4)
            let sampled = reconstruct_inactive(ctx, phase, z_sample, &y)?;
            let blended = if let Some(prev) = previous_phase_row {
                [
                    blend_across_transition(z_sample, z_transition, transition_width, prev[0], sampled[0]),
                    blend_across_transition(z_sample, z_transition, transition_width, prev[1], sampled[1]),
                    blend_across_transition(z_sample, z_transition, transition_width, prev[2], sampled[2]),
                ]
            } else {
                sampled
            };
            rows.push((mz_sample, blended));
            next_sample_idx += 1;
        }
    }

    debug!(?phase, mz_end, "phase integration complete");
    Ok(y)
}

/// Saha-equilibrium `x_H` for `phase` at the point described by `kctx`, or `None` if `phase`
/// integrates `x_H` numerically and has no Saha value of its own.
fn saha_x_h(phase: Phase, kctx: &KernelContext) -> Option<f64> {
    match phase {
        Phase::Brec | Phase::He1 | Phase::He1f | Phase::He2 => Some(1.0),
        Phase::H => Some(saha_h(kctx.t_rad, kctx.n_h)),
        Phase::Frec | Phase::Reio => None,
    }
}

/// Saha-equilibrium `x_He` for `phase` at the point described by `kctx`, or `None` if `phase`
/// integrates `x_He` numerically and has no Saha value of its own.
fn saha_x_he(phase: Phase, kctx: &KernelContext, f_he: f64) -> Option<f64> {
    match phase {
        Phase::Brec => Some(if f_he > 0.0 {
            saha_he2(kctx.t_rad, kctx.n_h, f_he) + saha_he1(kctx.t_rad, kctx.n_h, f_he)
        } else {
            0.0
        }),
        Phase::He1 | Phase::He1f => Some(saha_he1(kctx.t_rad, kctx.n_h, f_he)),
        Phase::He2 => Some(saha_he2(kctx.t_rad, kctx.n_h, f_he)),
        Phase::H => Some(1.0),
        Phase::Frec | Phase::Reio => None,
    }
}

/// Computes the Saha-equilibrium initial state for entry into `phase` at `z`, used to
/// re-initialize variables not yet being integrated numerically (§4.4).
fn saha_initial_state<B: Background, E: EnergyInjection>(
    ctx: &StepContext<B, E>,
    phase: Phase,
    z: f64,
    carry: &StateVec,
) -> Result<StateVec> {
    let kctx = ctx.kernel_context(z)?;
    let x_h = saha_x_h(phase, &kctx).unwrap_or(carry[1]);
    let x_he = saha_x_he(phase, &kctx, ctx.f_he).unwrap_or(carry[2]);
    Ok([carry[0], x_h, x_he])
}

/// Re-evaluates whichever of `x_H`/`x_He` are not actively integrated in `ctx.active` at `z`,
/// via their Saha formula, instead of carrying them at their frozen phase-entry value (§4.4).
/// Active components are passed through from `y` unchanged.
fn reconstruct_inactive<B: Background, E: EnergyInjection>(
    ctx: &StepContext<B, E>,
    phase: Phase,
    z: f64,
    y: &StateVec,
) -> Result<StateVec> {
    if ctx.active.x_h && ctx.active.x_he {
        return Ok(*y);
    }
    let kctx = ctx.kernel_context(z)?;
    let x_h = if ctx.active.x_h {
        y[1]
    } else {
        saha_x_h(phase, &kctx).unwrap_or(y[1])
    };
    let x_he = if ctx.active.x_he {
        y[2]
    } else {
        saha_x_he(phase, &kctx, ctx.f_he).unwrap_or(y[2])
    };
    Ok([y[0], x_h, x_he])
}

/// Everything the `reio` phase needs to re-integrate on its own, cached once so that repeated
/// shooting trials (§4.6) need not re-run `Brec..Frec` from scratch.
pub(crate) struct PreReioState {
    rows: Vec<(f64, StateVec)>,
    previous_row: Option<StateVec>,
    state: StateVec,
    z_start: f64,
    xe_before: f64,
    f_he: f64,
    n_h_today: f64,
}

fn n_h_today_of(config: &ThermoConfig, y_he: f64) -> f64 {
    const RHO_CRIT_OVER_H2: f64 = 1.878_2e-26; // kg / m^3 per unit h^2
    config.omega_b_h2 * RHO_CRIT_OVER_H2 * (1.0 - y_he) / M_H
}

fn solver_options(config: &ThermoConfig) -> SolverOptions {
    SolverOptions {
        tolerance: config.precision.ode_tolerance,
        newton_iterations: 4,
        max_halvings: 20,
    }
}

/// Drives every phase up to, but not including, `reio` (C4's `Brec..Frec` sequence), returning
/// the cached state the `reio` phase needs to pick up from (§4.6).
pub(crate) fn run_to_reio<B: Background, E: EnergyInjection>(
    config: &ThermoConfig,
    grid: &Grid,
    background: &B,
    injection: &E,
    y_he: f64,
) -> Result<PreReioState> {
    let f_he = y_he / (4.0 * (1.0 - y_he));
    let n_h_today = n_h_today_of(config, y_he);

    let engine = EngineR {
        peebles_trigger: config.precision.peebles_trigger,
        helium_switch: HeliumSwitch(1),
    };
    let ctx_base = StepContext {
        background,
        injection,
        engine,
        recombination: config.recombination,
        t_cmb: config.t_cmb,
        f_he,
        n_h_today,
        r_g: compton_coupling_r_g(),
        precision: &config.precision,
        active: Phase::Brec.active_vars(),
    };

    let boundaries =
        PhaseBoundaries::from_precision(&config.precision, config.grid.reionization_z_start_max);

    let sample_points: Vec<f64> = grid.z.iter().map(|&z| -z).collect();
    let options = solver_options(config);

    let mut state: StateVec = [config.t_cmb * (1.0 + grid.z[grid.len() - 1]), 1.0, {
        if f_he > 0.0 {
            1.0
        } else {
            0.0
        }
    }];
    let mut rows: Vec<(f64, StateVec)> = Vec::with_capacity(grid.len());
    let mut xe_before = 0.0;

    let transitions = boundaries.ordered_transitions();
    let mut previous_row: Option<StateVec> = None;

    for (idx, (phase, z_end)) in transitions.iter().enumerate() {
        let z_start = if idx == 0 {
            grid.z[grid.len() - 1]
        } else {
            transitions[idx - 1].1
        };
        let mz_start = -z_start;
        let mz_end = -z_end;

        let ctx = StepContext { active: phase.active_vars(), ..ctx_base };
        state = saha_initial_state(&ctx, *phase, z_start, &state)?;
        debug!(?phase, z_start, z_end, "entering phase");

        state = integrate_interval(
            &ctx,
            *phase,
            mz_start,
            mz_end,
            state,
            &sample_points,
            config.precision.transition_width,
            previous_row.as_ref(),
            &options,
            &mut rows,
        )?;
        previous_row = Some(state);

        if matches!(phase, Phase::Frec) {
            xe_before = state.x_e_total(f_he);
        }
    }

    let z_start = transitions[transitions.len() - 1].1;
    Ok(PreReioState { rows, previous_row, state, z_start, xe_before, f_he, n_h_today })
}

/// Integrates the `reio` phase from `pre` to `z = 0` and builds the final row table, applying
/// `config.reio_parametrization` (§4.6). `pre` is reusable across calls that only vary the
/// reionization scheme, since it holds everything upstream of the `reio` phase.
pub(crate) fn finish_reio<B: Background, E: EnergyInjection>(
    pre: &PreReioState,
    config: &ThermoConfig,
    grid: &Grid,
    background: &B,
    injection: &E,
) -> Result<(Vec<ThermoRow>, f64)> {
    let engine = EngineR {
        peebles_trigger: config.precision.peebles_trigger,
        helium_switch: HeliumSwitch(1),
    };
    let reio_phase = Phase::Reio;
    let ctx = StepContext {
        background,
        injection,
        engine,
        recombination: config.recombination,
        t_cmb: config.t_cmb,
        f_he: pre.f_he,
        n_h_today: pre.n_h_today,
        r_g: compton_coupling_r_g(),
        precision: &config.precision,
        active: reio_phase.active_vars(),
    };

    let sample_points: Vec<f64> = grid.z.iter().map(|&z| -z).collect();
    let options = solver_options(config);

    let mut rows = pre.rows.clone();
    let state = saha_initial_state(&ctx, reio_phase, pre.z_start, &pre.state)?;
    let _ = integrate_interval(
        &ctx,
        reio_phase,
        -pre.z_start,
        0.0,
        state,
        &sample_points,
        config.precision.transition_width,
        pre.previous_row.as_ref(),
        &options,
        &mut rows,
    )?;

    // reionization is additive: overwrite x_e on sampled rows below z_start via C2
    let reio_scheme = &config.reio_parametrization;
    let mut table_rows = Vec::with_capacity(rows.len());
    // descending mz == ascending z, matching the table convention of §3 (index 0 = today)
    rows.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    for (mz, st) in rows {
        let z = -mz;
        let tau = background.tau_of_z(z)?;
        let mut x_e = st.x_e_total(pre.f_he);
        if z <= pre.z_start {
            let (xe_reio, _) = reio_scheme.eval(z, pre.f_he, pre.xe_before);
            x_e = xe_reio;
        }
        let dkappa = (1.0 + z).powi(2) * pre.n_h_today * x_e * SIGMA_T * MPC_OVER_M;
        table_rows.push(ThermoRow {
            z,
            tau,
            x_e,
            dkappa,
            t_b: st[0],
            cb2: crate::constants::K_B * st[0] / (M_H * C * C)
                * (1.0 + (1.0 / 3.0) * (1.0 + pre.f_he) / (1.0 + pre.f_he + x_e)),
            ..ThermoRow::default()
        });
    }

    Ok((table_rows, pre.xe_before))
}

/// Drives the full evolution across every phase interval, writing a row into `table_rows` for
/// every grid point, and returning the residual `x_e` handed off at the `frec -> reio`
/// transition (§9 "xe_before back-channel").
pub fn run<B: Background, E: EnergyInjection>(
    config: &ThermoConfig,
    grid: &Grid,
    background: &B,
    injection: &E,
    y_he: f64,
) -> Result<(Vec<ThermoRow>, f64)> {
    let pre = run_to_reio(config, grid, background, injection, y_he)?;
    finish_reio(&pre, config, grid, background, injection)
}

trait TotalElectronFraction {
    fn x_e_total(&self, f_he: f64) -> f64;
}

impl TotalElectronFraction for StateVec {
    fn x_e_total(&self, f_he: f64) -> f64 {
        self[1] + f_he * self[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundState;
    use crate::config::{GridParams, PrecisionParams, ReioTarget, RecombinationEngine, YHeSource};
    use crate::energy_injection::NoInjection;
    use crate::reionization::ReionizationScheme;

    struct FlatBackground;

    impl Background for FlatBackground {
        fn tau_of_z(&self, z: f64) -> Result<f64> {
            Ok(1.0e4 / (1.0 + z).sqrt())
        }
        fn at_tau(&self, tau: f64, _detail: DetailLevel) -> Result<BackgroundState> {
            Ok(BackgroundState {
                hubble: 2.0 / tau,
                hubble_prime: -2.0 / (tau * tau),
                scale_factor: 1.0,
                ..Default::default()
            })
        }
    }

    fn small_config() -> ThermoConfig {
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
            grid: GridParams {
                z_initial: 6000.0,
                z_linear: 2000.0,
                reionization_z_start_max: 50.0,
                n_log: 10,
                n_lin: 10,
                n_reio: 5,
            },
            precision: PrecisionParams::default(),
        }
    }

    #[test]
    fn run_produces_one_row_per_grid_point() {
        let config = small_config();
        let grid = crate::grid::build(&config.grid, &FlatBackground).unwrap();
        let (rows, _xe_before) = run(&config, &grid, &FlatBackground, &NoInjection, 0.2454).unwrap();
        assert_eq!(rows.len(), grid.len());
    }

    #[test]
    fn x_e_stays_non_negative() {
        let config = small_config();
        let grid = crate::grid::build(&config.grid, &FlatBackground).unwrap();
        let (rows, _) = run(&config, &grid, &FlatBackground, &NoInjection, 0.2454).unwrap();
        for row in &rows {
            assert!(row.x_e >= -1.0e-6, "x_e = {} at z = {}", row.x_e, row.z);
        }
    }

    #[test]
    fn reconstruct_inactive_tracks_saha_across_a_phase() {
        let config = small_config();
        let engine = EngineR {
            peebles_trigger: config.precision.peebles_trigger,
            helium_switch: HeliumSwitch(1),
        };
        let f_he = 0.2454 / (4.0 * (1.0 - 0.2454));
        let n_h_today = n_h_today_of(&config, 0.2454);
        let ctx = StepContext {
            background: &FlatBackground,
            injection: &NoInjection,
            engine,
            recombination: RecombinationEngine::R,
            t_cmb: config.t_cmb,
            f_he,
            n_h_today,
            r_g: compton_coupling_r_g(),
            precision: &config.precision,
            active: Phase::He1.active_vars(),
        };
        let y: StateVec = [4000.0, 1.0, 1.0];
        let early = reconstruct_inactive(&ctx, Phase::He1, 3000.0, &y).unwrap();
        let late = reconstruct_inactive(&ctx, Phase::He1, 1500.0, &y).unwrap();
        assert!(
            (early[2] - late[2]).abs() > 1.0e-6,
            "x_He should vary with z across He1, got {} at z=3000 and {} at z=1500",
            early[2],
            late[2]
        );
    }

    #[test]
    fn finish_reio_composes_to_the_same_result_as_run() {
        let config = small_config();
        let grid = crate::grid::build(&config.grid, &FlatBackground).unwrap();
        let (direct_rows, direct_xe) =
            run(&config, &grid, &FlatBackground, &NoInjection, 0.2454).unwrap();
        let pre = run_to_reio(&config, &grid, &FlatBackground, &NoInjection, 0.2454).unwrap();
        let (split_rows, split_xe) =
            finish_reio(&pre, &config, &grid, &FlatBackground, &NoInjection).unwrap();
        assert_eq!(direct_rows.len(), split_rows.len());
        assert!((direct_xe - split_xe).abs() < 1.0e-12);
    }
}
