//! Recombination physics kernel (C3, §4.3).
//!
//! Computes the right-hand side of the hydrogen/helium ionization and matter-temperature ODE
//! system, in the `-z` time variable the evolver (C5) integrates in. Two engines are
//! selectable: the in-crate Peebles-style three-variable kernel ([`EngineR`]) and a thin
//! wrapper around an externally-supplied single-call kernel ([`EngineH`]).

use crate::constants::{
    A_RAD, EI_H_OVER_KB, EI_HE1_OVER_KB, EI_HE2_OVER_KB, K_B, LYA_2S1S_H, M_E,
};

/// State variables tracked by the evolver: matter temperature and the hydrogen/helium
/// ionization fractions. Not every field is meaningful in every phase (§4.4) — a phase that
/// hasn't started integrating `x_H` yet carries its last analytically-derived value here.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecombState {
    /// Matter (baryon) temperature (K).
    pub t_mat: f64,
    /// Hydrogen ionization fraction `n_p / n_H`.
    pub x_h: f64,
    /// Helium ionization fraction `n_{He+} / n_He` (engine R tracks only singly-ionized
    /// helium numerically; doubly-ionized helium is always in Saha equilibrium at the
    /// redshifts engine R integrates `x_he`).
    pub x_he: f64,
}

impl RecombState {
    /// Total free-electron fraction `x_e = x_H + f_He x_He` relative to `n_H`.
    #[must_use]
    pub fn x_e(&self, f_he: f64) -> f64 {
        self.x_h + f_he * self.x_he
    }
}

/// Time derivatives of [`RecombState`] with respect to `-z`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecombDerivatives {
    /// `d T_mat / d(-z)`.
    pub d_t_mat: f64,
    /// `d x_H / d(-z)`.
    pub d_x_h: f64,
    /// `d x_He / d(-z)`.
    pub d_x_he: f64,
}

/// Everything the kernel needs from the background and energy-injection collaborators at a
/// given redshift, queried once per derivative evaluation by the evolver driver (C5).
#[derive(Clone, Copy, Debug)]
pub struct KernelContext {
    /// Redshift.
    pub z: f64,
    /// Conformal Hubble rate (1/Mpc), converted by the caller to the proper-time Hubble rate
    /// consistent with the rest of this module's SI-ish unit mix.
    pub hubble: f64,
    /// `d ln H / dz`.
    pub dlnh_dz: f64,
    /// Radiation (CMB) temperature at this redshift (K).
    pub t_rad: f64,
    /// Physical hydrogen number density at this redshift (1/m^3).
    pub n_h: f64,
    /// Helium-to-hydrogen number ratio.
    pub f_he: f64,
    /// Exotic energy injection rate at this redshift (J/m^3/s).
    pub energy_rate: f64,
}

/// Which physical corrections the helium Peebles-equivalent equation includes (§4.3 "He-switch"
/// values 0-6): higher values add Doppler broadening, continuum opacity, and triplet-state
/// corrections on top of the base singlet recombination rate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeliumSwitch(pub u8);

impl HeliumSwitch {
    fn doppler_correction(self) -> bool {
        self.0 >= 1
    }
    fn continuum_opacity_correction(self) -> bool {
        self.0 >= 2
    }
    fn triplet_correction(self) -> bool {
        self.0 >= 3
    }
}

/// Saha-equilibrium hydrogen ionization fraction at `(t_rad, n_h)`, solving
/// `x^2 / (1 - x) = S` for the physical (non-negative, `<= 1`) root.
#[must_use]
pub fn saha_h(t_rad: f64, n_h: f64) -> f64 {
    saha_ratio(t_rad, n_h, EI_H_OVER_KB, 1.0)
}

/// Saha-equilibrium `He III -> He II` ionization fraction (statistical weight ratio `g+/g0 = 4`).
#[must_use]
pub fn saha_he2(t_rad: f64, n_h: f64, f_he: f64) -> f64 {
    saha_he_ratio(t_rad, n_h, f_he, EI_HE2_OVER_KB, 1.0)
}

/// Saha-equilibrium `He II -> He I` ionization fraction (statistical weight ratio `g+/g0 = 4`).
#[must_use]
pub fn saha_he1(t_rad: f64, n_h: f64, f_he: f64) -> f64 {
    saha_he_ratio(t_rad, n_h, f_he, EI_HE1_OVER_KB, 4.0)
}

/// Solves the generic two-level Saha balance `x^2 n / (1-x) = rhs(T)` for hydrogen-like species,
/// returning the physical root in `[0, 1]`.
fn saha_ratio(t_rad: f64, n_h: f64, ionization_temp: f64, degeneracy_ratio: f64) -> f64 {
    let rhs = saha_rhs(t_rad, ionization_temp) * degeneracy_ratio / n_h;
    // x^2/(1-x) = rhs  =>  x^2 + rhs*x - rhs = 0
    let x = 0.5 * (-rhs + (rhs * rhs + 4.0 * rhs).sqrt());
    x.clamp(0.0, 1.0)
}

fn saha_he_ratio(t_rad: f64, n_h: f64, f_he: f64, ionization_temp: f64, degeneracy_ratio: f64) -> f64 {
    if f_he <= 0.0 {
        return 0.0;
    }
    let rhs = saha_rhs(t_rad, ionization_temp) * degeneracy_ratio / (f_he * n_h);
    let x = 0.5 * (-rhs + (rhs * rhs + 4.0 * rhs).sqrt());
    x.clamp(0.0, 1.0)
}

/// The `(m_e k_B T / 2 pi hbar^2)^{3/2} exp(-T_ion/T)` factor common to every two-level Saha
/// balance.
fn saha_rhs(t_rad: f64, ionization_temp: f64) -> f64 {
    const HBAR: f64 = crate::constants::H_PLANCK / (2.0 * std::f64::consts::PI);
    (M_E * K_B * t_rad / (2.0 * std::f64::consts::PI * HBAR * HBAR)).powf(1.5)
        * (-ionization_temp / t_rad).exp()
}

/// Saturating dark-matter-ionization efficiency fit, `chi_ion,H(x)` (§4.3).
#[must_use]
pub fn chi_ion_h(x: f64) -> f64 {
    if x < 1.0 {
        0.369 * (1.0 - x.powf(0.464)).powf(1.702)
    } else {
        0.0
    }
}

/// Saturating dark-matter-heating efficiency fit, `chi_heat(x)` (§4.3).
#[must_use]
pub fn chi_heat(x: f64) -> f64 {
    if x < 1.0 {
        (0.997 * (1.0 - (1.0 - x.powf(0.300)).powf(1.510))).min(1.0)
    } else {
        1.0
    }
}

/// Fudge-factor double-Gaussian correction to the two-photon decay rate, `K`, as a function of
/// `log(1+z)` (§4.3, §9 "do not simplify").
fn fudge_k(z: f64, h_per_mpc_to_per_s: f64) -> f64 {
    const FUDGE_BASE: f64 = 1.14;
    const A_GAUSS_1: f64 = 0.56;
    const A_GAUSS_2: f64 = 0.21;
    const Z_GAUSS_1: f64 = 7.28;
    const Z_GAUSS_2: f64 = 6.73;
    const W_GAUSS_1: f64 = 0.18;
    const W_GAUSS_2: f64 = 0.33;

    let l = (1.0 + z).ln();
    let correction = 1.0
        + A_GAUSS_1 * (-((l - Z_GAUSS_1) / W_GAUSS_1).powi(2)).exp()
        + A_GAUSS_2 * (-((l - Z_GAUSS_2) / W_GAUSS_2).powi(2)).exp();
    let lambda_lya3 = (1.215_67e-7_f64).powi(3);
    FUDGE_BASE * correction * lambda_lya3 / (8.0 * std::f64::consts::PI * h_per_mpc_to_per_s)
}

/// Case-B recombination coefficient fit for hydrogen (m^3/s), a standard power-law fit in
/// `T_mat` valid across the recombination temperature range.
fn alpha_h(t_mat: f64) -> f64 {
    const A: f64 = 4.309e-19;
    const B: f64 = -0.6166;
    const T1: f64 = 1.0;
    const T2: f64 = 9.619e2;
    let t4 = t_mat / 1.0e4;
    A * t4.powf(B) / (1.0 + (t4 / T2).powf(0.53)) * T1
}

/// Peebles-style hydrogen/helium recombination engine (§4.3 "Engine R").
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineR {
    /// `x_H` threshold above which the Peebles coefficient `C` collapses to 1.
    pub peebles_trigger: f64,
    /// Which He-switch corrections (§4.3) are active.
    pub helium_switch: HeliumSwitch,
}

impl EngineR {
    /// Computes `(d x_H/d(-z), d x_He/d(-z))` given the current state and context.
    #[must_use]
    pub fn ionization_derivatives(&self, state: &RecombState, ctx: &KernelContext) -> (f64, f64) {
        let dt_dz = -1.0 / ((1.0 + ctx.z) * ctx.hubble);
        let x_e = state.x_e(ctx.f_he);

        let d_x_h = self.d_x_h_dz(state, ctx, x_e, dt_dz);
        let d_x_he = self.d_x_he_dz(state, ctx, x_e, dt_dz);

        (d_x_h, d_x_he)
    }

    fn d_x_h_dz(&self, state: &RecombState, ctx: &KernelContext, x_e: f64, dt_dz: f64) -> f64 {
        let alpha = alpha_h(state.t_mat);
        let beta = alpha
            * (M_E * K_B * ctx.t_rad / (2.0 * std::f64::consts::PI * crate::constants::H_PLANCK.powi(2)))
                .powf(1.5)
            * (-(EI_H_OVER_KB - EI_H_OVER_KB / 4.0) / ctx.t_rad).exp();

        let k = fudge_k(ctx.z, ctx.hubble * crate::constants::C / crate::constants::MPC_OVER_M);
        let one_minus_xh = (1.0 - state.x_h).max(0.0);

        let c = if state.x_h > self.peebles_trigger {
            1.0
        } else {
            let numer = 1.0 + k * LYA_2S1S_H * ctx.n_h * one_minus_xh;
            let denom = 1.0 + k * (LYA_2S1S_H + beta) * ctx.n_h * one_minus_xh;
            numer / denom
        };

        let recombination_rate =
            c * (alpha * x_e * state.x_h * ctx.n_h - beta * one_minus_xh * (-EI_H_OVER_KB / 4.0 / ctx.t_rad).exp());

        let injection = ctx.energy_rate * chi_ion_h(x_e) / (EI_H_OVER_KB * K_B * ctx.n_h);

        dt_dz * (recombination_rate - injection)
    }

    fn d_x_he_dz(&self, state: &RecombState, ctx: &KernelContext, x_e: f64, dt_dz: f64) -> f64 {
        if ctx.f_he <= 0.0 {
            return 0.0;
        }

        let alpha = alpha_h(state.t_mat) * 1.5; // helium case-B coefficient, same functional form
        let beta = alpha
            * (M_E * K_B * ctx.t_rad / (2.0 * std::f64::consts::PI * crate::constants::H_PLANCK.powi(2)))
                .powf(1.5)
            * (-(EI_HE1_OVER_KB / 4.0) / ctx.t_rad).exp();

        let mut correction = 1.0;
        if self.helium_switch.doppler_correction() && state.x_h < 0.99 {
            correction *= 1.0 + 0.02 * (1.0 - state.x_h);
        }
        if self.helium_switch.continuum_opacity_correction() && state.x_he < 0.99 {
            correction *= 1.0 - 0.01 * state.x_he;
        }
        if self.helium_switch.triplet_correction() && state.x_he > 0.01 && state.x_he < 0.99 {
            correction *= 1.0 + 0.05 * state.x_he * (1.0 - state.x_he);
        }

        let rate = correction
            * (alpha * x_e * state.x_he * ctx.f_he * ctx.n_h
                - beta * (1.0 - state.x_he).max(0.0) * (-(EI_HE1_OVER_KB / 4.0) / ctx.t_rad).exp());

        dt_dz * rate
    }

    /// Computes `d T_mat/d(-z)`, dispatching between the tight-coupling steady-state expansion
    /// and the full Compton-coupling equation depending on `t_th_over_t_h` against
    /// `tight_coupling_trigger` (§4.3, §9 "do not simplify").
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn matter_temperature_derivative(
        &self,
        state: &RecombState,
        ctx: &KernelContext,
        dlnx_dz: f64,
        t_cmb: f64,
        r_g: f64,
        tight_coupling_trigger: f64,
    ) -> f64 {
        let x = state.x_e(ctx.f_he);
        let t_th = 1.0 / (r_g * (1.0 + x + ctx.f_he) / x * ctx.t_rad.powi(4));
        let t_h = 1.0 / ctx.hubble;

        if t_th < tight_coupling_trigger * t_h {
            let eps = ctx.hubble * (1.0 + x + ctx.f_he) / (r_g * ctx.t_rad.powi(3) * x);
            let dln_eps_dz = ctx.dlnh_dz
                - (1.0 + ctx.f_he) / (1.0 + x + ctx.f_he) * dlnx_dz
                - 3.0 / (1.0 + ctx.z);
            t_cmb - eps * dln_eps_dz
        } else {
            let heating = (2.0 / (3.0 * K_B)) * ctx.energy_rate * chi_heat(x)
                / (ctx.n_h * (1.0 + ctx.f_he + x) * ctx.hubble * (1.0 + ctx.z));
            r_g * x / (1.0 + x + ctx.f_he) * (state.t_mat - ctx.t_rad) / (ctx.hubble * (1.0 + ctx.z))
                + 2.0 * state.t_mat / (1.0 + ctx.z)
                - heating
        }
    }
}

/// A single-call external recombination kernel (§4.3 "Engine H"), subsuming both hydrogen and
/// helium into one `(x, dx/d ln a)` query.
pub trait ExternalRecombinationKernel {
    /// Evaluates the combined ionization fraction and its logarithmic-scale-factor derivative.
    fn evaluate(&self, z: f64, hubble: f64, t_mat: f64, t_rad: f64, energy_rate: f64) -> (f64, f64);
}

/// Wraps an [`ExternalRecombinationKernel`], converting its `d/d ln a` convention to this
/// crate's `d/d(-z)` convention for use by the evolver driver (C5).
pub struct EngineH<'a, K: ExternalRecombinationKernel> {
    kernel: &'a K,
}

impl<'a, K: ExternalRecombinationKernel> EngineH<'a, K> {
    /// Wraps `kernel`.
    #[must_use]
    pub fn new(kernel: &'a K) -> Self {
        Self { kernel }
    }

    /// Computes `(x, d x/d(-z))`.
    #[must_use]
    pub fn ionization_derivative(&self, ctx: &KernelContext, t_mat: f64) -> (f64, f64) {
        let (x, dx_dlna) = self
            .kernel
            .evaluate(ctx.z, ctx.hubble, t_mat, ctx.t_rad, ctx.energy_rate);
        // d ln a = -d z / (1+z)
        let dx_dz = -dx_dlna / (1.0 + ctx.z);
        (x, dx_dz)
    }
}

/// A minimal, in-crate stand-in for a wrapped external kernel (§4.3 "Engine H"). Re-derives
/// engine R's hydrogen Peebles equation through the single-call interface, using the Saha value
/// at `z` as a local proxy for "current `x_H`" since [`ExternalRecombinationKernel::evaluate`]
/// carries no integration history. Helium is left to the existing Saha machinery in both
/// engines (§4.3) — engine H only replaces the hydrogen equation.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceKernel {
    /// Physical hydrogen number density today (1/m^3).
    pub n_h_today: f64,
    /// `x_H` threshold above which the Peebles coefficient `C` collapses to 1.
    pub peebles_trigger: f64,
}

impl ExternalRecombinationKernel for ReferenceKernel {
    fn evaluate(&self, z: f64, hubble: f64, t_mat: f64, t_rad: f64, energy_rate: f64) -> (f64, f64) {
        let n_h = self.n_h_today * (1.0 + z).powi(3);
        let x_saha = saha_h(t_rad, n_h);
        let state = RecombState {
            t_mat,
            x_h: x_saha,
            x_he: 0.0,
        };
        let ctx = KernelContext {
            z,
            hubble,
            dlnh_dz: 0.0,
            t_rad,
            n_h,
            f_he: 0.0,
            energy_rate,
        };
        let engine = EngineR {
            peebles_trigger: self.peebles_trigger,
            helium_switch: HeliumSwitch(0),
        };
        let dt_dz = -1.0 / ((1.0 + z) * hubble);
        let d_x_h = engine.d_x_h_dz(&state, &ctx, x_saha, dt_dz);
        // evaluate() reports d/d(ln a); the wrapper inverts this same conversion (§4.3)
        let dx_dlna = -(1.0 + z) * d_x_h;
        (x_saha, dx_dlna)
    }
}

/// Radiation-matter Compton coupling constant `R_g` used by the `T_mat` equation (§4.3), built
/// from the Thomson cross section and the radiation constant.
#[must_use]
pub fn compton_coupling_r_g() -> f64 {
    (8.0 / 3.0) * crate::constants::SIGMA_T * A_RAD / (M_E * crate::constants::C)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn saha_h_is_fully_ionized_at_high_temperature() {
        let x = saha_h(1.0e5, 1.0e10);
        assert!(x > 0.999);
    }

    #[test]
    fn saha_h_is_neutral_at_low_temperature() {
        let x = saha_h(500.0, 1.0e10);
        assert!(x < 1.0e-3);
    }

    #[test]
    fn chi_ion_h_vanishes_at_full_ionization() {
        assert_approx_eq!(f64, chi_ion_h(1.0), 0.0, epsilon = 1e-12);
        assert!(chi_ion_h(0.0) > 0.0);
    }

    #[test]
    fn chi_heat_saturates_at_one() {
        assert_approx_eq!(f64, chi_heat(1.0), 1.0, epsilon = 1e-12);
        assert!(chi_heat(0.5) <= 1.0);
    }

    #[test]
    fn reference_kernel_agrees_with_engine_r_near_full_ionization() {
        let kernel = ReferenceKernel {
            n_h_today: 2.0e2,
            peebles_trigger: 0.99,
        };
        let (x, dx_dlna) = kernel.evaluate(1500.0, 1.0e-4, 4000.0, 4000.0, 0.0);
        assert!(x > 0.99, "x = {x} should be near full ionization at z = 1500");
        assert!(dx_dlna.is_finite());
    }

    #[test]
    fn peebles_coefficient_collapses_to_one_above_trigger() {
        let engine = EngineR {
            peebles_trigger: 0.99,
            helium_switch: HeliumSwitch(0),
        };
        let state = RecombState {
            t_mat: 3000.0,
            x_h: 0.995,
            x_he: 0.0,
        };
        let ctx = KernelContext {
            z: 1100.0,
            hubble: 1.0e-4,
            dlnh_dz: 1.5e-3,
            t_rad: 3000.0,
            n_h: 1.0e2,
            f_he: 0.08,
            energy_rate: 0.0,
        };
        // with x_h above the trigger the recombination term should still be well-defined
        // (no division blow-up from (1 - x_h) factors in the denominator)
        let (d_x_h, _) = engine.ionization_derivatives(&state, &ctx);
        assert!(d_x_h.is_finite());
    }
}
