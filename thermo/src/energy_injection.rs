//! Exotic-energy-injection collaborator contract (§6, §9 "in-progress energy-injection
//! refactor").
//!
//! §9 flags that the source this crate descends from carries two parallel, partially-duplicated
//! injection implementations, only one of which is wired up. This module picks the single
//! well-typed callback the design notes call for and does not reintroduce the second one.

/// A scalar energy-injection rate as a function of redshift (J/m^3/s). Zero when no exotic
/// channel (dark-matter annihilation/decay, PBH accretion/evaporation, ...) is active.
pub trait EnergyInjection {
    /// On-the-spot injected energy rate at redshift `z` (J/m^3/s).
    fn on_the_spot_rate(&self, z: f64) -> f64;
}

/// An [`EnergyInjection`] that is always zero; the default when no exotic channel is
/// configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInjection;

impl EnergyInjection for NoInjection {
    fn on_the_spot_rate(&self, _z: f64) -> f64 {
        0.0
    }
}

/// Parameters of the redshift convolution kernel used to smear an on-the-spot rate into an
/// effective rate when the on-the-spot approximation is disabled (§6).
#[derive(Clone, Copy, Debug)]
pub struct SmearingKernel {
    /// Prefactor `factor` in the exponential kernel.
    pub factor: f64,
    /// Power of `(1+z)` in the kernel numerator.
    pub exp_z: f64,
    /// Power of `(1+z')` in the kernel denominator.
    pub exp_zp: f64,
}

/// Wraps an on-the-spot [`EnergyInjection`] and convolves it with [`SmearingKernel`] via
/// trapezoidal quadrature in steps of `delta_z = 1`, stopping once the integrand has fallen
/// below 2% of its value at the first step (§6).
pub struct SmearedInjection<'a, E: EnergyInjection> {
    inner: &'a E,
    kernel: SmearingKernel,
}

impl<'a, E: EnergyInjection> SmearedInjection<'a, E> {
    /// Wraps `inner` with the redshift-smearing `kernel`.
    pub fn new(inner: &'a E, kernel: SmearingKernel) -> Self {
        Self { inner, kernel }
    }

    fn weight(&self, z: f64, zp: f64) -> f64 {
        let SmearingKernel {
            factor,
            exp_z,
            exp_zp,
        } = self.kernel;
        let numer = (1.0 + z).powf(exp_z);
        let denom = (1.0 + zp).powf(exp_zp);
        (numer / denom) * (2.0 / 3.0 * factor * ((1.0 + z).powf(1.5) - (1.0 + zp).powf(1.5))).exp()
    }
}

impl<'a, E: EnergyInjection> EnergyInjection for SmearedInjection<'a, E> {
    fn on_the_spot_rate(&self, z: f64) -> f64 {
        const DELTA_Z: f64 = 1.0;
        const CUTOFF_FRACTION: f64 = 0.02;

        let mut zp = z;
        let mut integrand_first = None;
        let mut accumulator = 0.0;
        let mut previous = self.inner.on_the_spot_rate(zp) * self.weight(z, zp);

        loop {
            let next_zp = zp + DELTA_Z;
            let next = self.inner.on_the_spot_rate(next_zp) * self.weight(z, next_zp);
            accumulator += 0.5 * (previous + next) * DELTA_Z;

            let first = *integrand_first.get_or_insert(next.abs().max(previous.abs()));
            if first > 0.0 && next.abs() < CUTOFF_FRACTION * first {
                break;
            }
            // guard against a pathological kernel that never decays
            if next_zp - z > 1.0e5 {
                break;
            }

            zp = next_zp;
            previous = next;
        }

        accumulator
    }
}
