//! Closed-form flat-LCDM background provider.
//!
//! `thermo` treats the background cosmology as an opaque collaborator (§1 Non-goals); someone
//! has to supply one to actually run the binary end to end. This is deliberately the simplest
//! thing that satisfies the [`thermo::background::Background`] contract: a flat
//! matter+radiation+Lambda expansion history with conformal time obtained by quadrature rather
//! than a tabulated Boltzmann solution.

use serde::{Deserialize, Serialize};
use thermo::background::{Background, BackgroundState, DetailLevel};
use thermo::error::Result;

const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-11;
const QUADRATURE_STEPS: usize = 4000;

/// Parameters fixing a flat-LCDM expansion history, read alongside [`thermo::config::ThermoConfig`]
/// from the CLI's YAML configuration file.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct BackgroundParams {
    /// Dimensionless Hubble parameter `h` (`H_0 = 100 h` km/s/Mpc).
    pub h: f64,
    /// `Omega_cdm h^2`.
    pub omega_cdm_h2: f64,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            h: 0.6736,
            omega_cdm_h2: 0.1200,
        }
    }
}

/// A flat LCDM background, closed over its density parameters at construction time.
pub struct FlatLcdmBackground {
    h0: f64,
    omega_b: f64,
    omega_m: f64,
    omega_gamma: f64,
    omega_r: f64,
    omega_lambda: f64,
    tau_today: f64,
}

impl FlatLcdmBackground {
    /// Builds the background from `params`, the CMB temperature and `Omega_b h^2` carried by the
    /// thermo config (radiation density is derived from `t_cmb` and `n_eff`, not supplied
    /// separately; matter is baryons plus `params.omega_cdm_h2`).
    ///
    /// # Errors
    ///
    /// Returns [`thermo::error::Error::Domain`] if the implied `Omega_Lambda` would be negative.
    pub fn new(params: BackgroundParams, t_cmb: f64, n_eff: f64, omega_b_h2: f64) -> Result<Self> {
        // H_0 in 1/Mpc: 100 h km/s/Mpc divided by c in km/s.
        let h0_inv_mpc = 100.0 * params.h / (thermo::constants::C / 1000.0);

        let rho_crit0 =
            3.0 * (h0_inv_mpc * thermo::constants::C / thermo::constants::MPC_OVER_M).powi(2)
                / (8.0 * std::f64::consts::PI * GRAVITATIONAL_CONSTANT);
        let rho_gamma0 = thermo::constants::A_RAD * t_cmb.powi(4);
        let omega_gamma = rho_gamma0 / rho_crit0;
        let omega_nu = n_eff * (7.0 / 8.0) * (4.0 / 11.0_f64).powf(4.0 / 3.0) * omega_gamma;
        let omega_r = omega_gamma + omega_nu;
        let omega_b = omega_b_h2 / params.h.powi(2);
        let omega_cdm = params.omega_cdm_h2 / params.h.powi(2);
        let omega_m = omega_b + omega_cdm;
        let omega_lambda = 1.0 - omega_m - omega_r;
        if omega_lambda < 0.0 {
            return Err(thermo::error::Error::domain(format!(
                "implied Omega_Lambda = {omega_lambda} is negative; check h/omega_b_h2/omega_cdm_h2/t_cmb"
            )));
        }

        let mut background = Self {
            h0: h0_inv_mpc,
            omega_b,
            omega_m,
            omega_gamma,
            omega_r,
            omega_lambda,
            tau_today: 0.0,
        };
        background.tau_today = background.tau_of_a(1.0);
        Ok(background)
    }

    fn e_of_a(&self, a: f64) -> f64 {
        (self.omega_r / a.powi(4) + self.omega_m / a.powi(3) + self.omega_lambda).sqrt()
    }

    /// `H_conf(a) = a H_0 E(a)`, the conformal Hubble rate (1/Mpc).
    fn hubble_conformal(&self, a: f64) -> f64 {
        self.h0 * a * self.e_of_a(a)
    }

    /// `dH_conf/da`, obtained analytically by differentiating `E(a)`.
    fn dhubble_conformal_da(&self, a: f64) -> f64 {
        let f = self.omega_r / a.powi(4) + self.omega_m / a.powi(3) + self.omega_lambda;
        let fp = -4.0 * self.omega_r / a.powi(5) - 3.0 * self.omega_m / a.powi(4);
        self.h0 * (f.sqrt() + a * fp / (2.0 * f.sqrt()))
    }

    fn tau_of_a(&self, a_target: f64) -> f64 {
        simpson(a_target, QUADRATURE_STEPS, |a| {
            if a == 0.0 {
                1.0 / (self.h0 * self.omega_r.sqrt())
            } else {
                1.0 / (a * a * self.h0 * self.e_of_a(a))
            }
        })
    }

    fn a_of_tau(&self, tau: f64) -> f64 {
        let (mut lo, mut hi) = (1.0e-12_f64, 1.0_f64.max(2.0 * (tau / self.tau_today.max(1e-300))));
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.tau_of_a(mid) < tau {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// `R(a) = (3/4) rho_b / rho_gamma`, the baryon-loading ratio entering the sound speed.
    fn baryon_loading(&self, a: f64) -> f64 {
        0.75 * (self.omega_b / a.powi(3)) / (self.omega_gamma / a.powi(4))
    }

    /// Comoving sound horizon `r_s(a) = int_0^tau(a) c_s dtau'`, `c_s = 1/sqrt(3(1+R))`.
    fn sound_horizon_of_a(&self, a_target: f64) -> f64 {
        simpson(a_target, QUADRATURE_STEPS, |a| {
            if a == 0.0 {
                // R -> 0 as a -> 0 (radiation-dominated limit), so c_s -> 1/sqrt(3).
                1.0 / (3.0_f64.sqrt() * self.h0 * self.omega_r.sqrt())
            } else {
                let c_s = 1.0 / (3.0 * (1.0 + self.baryon_loading(a))).sqrt();
                c_s / (a * a * self.h0 * self.e_of_a(a))
            }
        })
    }
}

impl Background for FlatLcdmBackground {
    fn tau_of_z(&self, z: f64) -> Result<f64> {
        Ok(self.tau_of_a(1.0 / (1.0 + z)))
    }

    fn at_tau(&self, tau: f64, detail: DetailLevel) -> Result<BackgroundState> {
        let a = self.a_of_tau(tau);
        let hubble = self.hubble_conformal(a);

        let mut state = BackgroundState {
            hubble,
            scale_factor: a,
            ..BackgroundState::default()
        };

        if matches!(detail, DetailLevel::Normal | DetailLevel::Long) {
            state.hubble_prime = a * hubble * self.dhubble_conformal_da(a);
            state.rho_gamma = self.omega_gamma / a.powi(4);
            state.rho_b = self.omega_b / a.powi(3);
            state.rho_cdm = (self.omega_m - self.omega_b) / a.powi(3);
            state.rho_crit = 1.0;
            state.omega_r = (self.omega_r / a.powi(4)) / (self.e_of_a(a) * self.e_of_a(a));
            state.conformal_age = tau;
        }

        if matches!(detail, DetailLevel::Long) {
            state.angular_diameter_distance = a * (self.tau_today - tau).max(0.0);
            state.time = cosmic_time(self, a);
            state.sound_horizon = self.sound_horizon_of_a(a);
        }

        Ok(state)
    }
}

/// Cosmic (proper) time at scale factor `a`, `t = int_0^a da'/(a' H(a'))` (s).
fn cosmic_time(bg: &FlatLcdmBackground, a_target: f64) -> f64 {
    let integral_mpc = simpson(a_target, QUADRATURE_STEPS, |a| {
        if a == 0.0 {
            0.0
        } else {
            1.0 / (a * bg.h0 * bg.e_of_a(a))
        }
    });
    integral_mpc * thermo::constants::MPC_OVER_M / thermo::constants::C
}

/// Composite Simpson's rule over `[0, upper]` with an even number of sub-intervals.
fn simpson(upper: f64, steps: usize, f: impl Fn(f64) -> f64) -> f64 {
    if upper <= 0.0 {
        return 0.0;
    }
    let n = if steps % 2 == 0 { steps } else { steps + 1 };
    let h = upper / thermo::convert::f64_from_usize(n);
    let mut sum = f(0.0) + f(upper);
    for i in 1..n {
        let x = thermo::convert::f64_from_usize(i) * h;
        sum += if i % 2 == 0 { 2.0 } else { 4.0 } * f(x);
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn matter_dominated_limit_grows_as_sqrt_a() {
        let bg = FlatLcdmBackground::new(
            BackgroundParams {
                h: 0.7,
                omega_cdm_h2: 0.98 * 0.7 * 0.7,
            },
            0.0001,
            0.0,
            0.0,
        )
        .unwrap();
        let tau_1 = bg.tau_of_a(0.01);
        let tau_4 = bg.tau_of_a(0.04);
        assert_approx_eq!(f64, tau_4 / tau_1, 2.0, epsilon = 0.05);
    }

    #[test]
    fn round_trips_a_and_tau() {
        let bg = FlatLcdmBackground::new(BackgroundParams::default(), 2.7255, 3.046, 0.02237).unwrap();
        let z = 1089.0;
        let tau = bg.tau_of_z(z).unwrap();
        let a = bg.a_of_tau(tau);
        assert_approx_eq!(f64, a, 1.0 / (1.0 + z), epsilon = 1.0e-6);
    }

    #[test]
    fn sound_horizon_grows_with_conformal_time() {
        let bg = FlatLcdmBackground::new(BackgroundParams::default(), 2.7255, 3.046, 0.02237).unwrap();
        let r_s_early = bg.sound_horizon_of_a(1.0 / 1101.0);
        let r_s_late = bg.sound_horizon_of_a(1.0 / 1089.0);
        assert!(r_s_late > r_s_early);
        assert!(r_s_early > 0.0);
    }

    #[test]
    fn rejects_overclosed_configuration() {
        let err = FlatLcdmBackground::new(
            BackgroundParams {
                h: 0.7,
                omega_cdm_h2: 10.0,
            },
            2.7255,
            3.046,
            0.02237,
        );
        assert!(err.is_err());
    }
}
