//! Approximation scheduler (C4, §4.4).
//!
//! A tagged state machine over the seven recombination/reionization phases, avoiding the
//! string tags and integer magic numbers §9 warns against at API boundaries. Each phase maps to
//! a fixed set of actively-integrated variables and an ending redshift; transitions are driven
//! by [`PhaseTable::phase_at`], and the smoothing overlap of §4.4 is applied by
//! [`PhaseTable::blend_weight`].

use crate::config::PrecisionParams;

/// The seven ordered recombination/reionization phases (§4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Phase {
    /// Before any recombination; everything fully ionized.
    Brec,
    /// First helium recombination (Saha He III -> He II).
    He1,
    /// First helium recombination finished.
    He1f,
    /// Second helium recombination (Saha He II -> He I).
    He2,
    /// Hydrogen recombination begins.
    H,
    /// Full recombination.
    Frec,
    /// Reionization regime.
    Reio,
}

/// Which state variables a phase actively integrates numerically. Variables not in this set are
/// not perturbed by the ODE corrector; the evolver's sample sink re-evaluates them via the
/// Saha formula appropriate to the current phase at every requested `z` instead of carrying a
/// single value across the whole phase (§4.4).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ActiveVars {
    /// Whether `T_mat` is integrated (true in every phase).
    pub t_mat: bool,
    /// Whether `x_H` is integrated.
    pub x_h: bool,
    /// Whether `x_He` is integrated.
    pub x_he: bool,
}

impl Phase {
    /// The variables this phase integrates numerically (§4.4 table).
    #[must_use]
    pub fn active_vars(self) -> ActiveVars {
        match self {
            Self::Brec | Self::He1 | Self::He1f | Self::He2 => ActiveVars {
                t_mat: true,
                x_h: false,
                x_he: false,
            },
            Self::H => ActiveVars {
                t_mat: true,
                x_h: false,
                x_he: true,
            },
            Self::Frec | Self::Reio => ActiveVars {
                t_mat: true,
                x_h: true,
                x_he: true,
            },
        }
    }

    /// The phase following this one, or `None` for [`Phase::Reio`] (the last phase).
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Brec => Some(Self::He1),
            Self::He1 => Some(Self::He1f),
            Self::He1f => Some(Self::He2),
            Self::He2 => Some(Self::H),
            Self::H => Some(Self::Frec),
            Self::Frec => Some(Self::Reio),
            Self::Reio => None,
        }
    }
}

/// Computed redshift boundaries between phases, derived once from [`PrecisionParams`] and the
/// cosmology's He-Saha thresholds.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBoundaries {
    /// End of [`Phase::Brec`] / start of [`Phase::He1`].
    pub z_he1_start: f64,
    /// End of [`Phase::He1`] / start of [`Phase::He1f`].
    pub z_he1_end: f64,
    /// End of [`Phase::He1f`] / start of [`Phase::He2`].
    pub z_he2_start: f64,
    /// End of [`Phase::He2`] / start of [`Phase::H`], see [`PrecisionParams::z_he2_limit`].
    pub z_he2_end: f64,
    /// End of [`Phase::H`] / start of [`Phase::Frec`], see [`PrecisionParams::z_h_limit`].
    pub z_h_end: f64,
    /// End of [`Phase::Frec`] / start of [`Phase::Reio`].
    pub z_reio_start: f64,
}

impl PhaseBoundaries {
    /// Derives phase boundaries: helium thresholds bracket the precision-configured
    /// [`PrecisionParams::z_he2_limit`] by a fixed factor, the hydrogen threshold is
    /// [`PrecisionParams::z_h_limit`] directly, and reionization starts at `z_reio_max`.
    #[must_use]
    pub fn from_precision(precision: &PrecisionParams, z_reio_max: f64) -> Self {
        Self {
            z_he1_start: precision.z_he2_limit * 2.5,
            z_he1_end: precision.z_he2_limit * 1.5,
            z_he2_start: precision.z_he2_limit * 1.2,
            z_he2_end: precision.z_he2_limit,
            z_h_end: precision.z_h_limit,
            z_reio_start: z_reio_max,
        }
    }

    /// The phase active at `z`, and that phase's ending redshift (`m_z_end`, in the
    /// `-z` time variable the evolver integrates in, so the *smaller* of the two bounding
    /// redshifts).
    #[must_use]
    pub fn phase_at(&self, z: f64) -> (Phase, f64) {
        if z > self.z_he1_start {
            (Phase::Brec, self.z_he1_start)
        } else if z > self.z_he1_end {
            (Phase::He1, self.z_he1_end)
        } else if z > self.z_he2_start {
            (Phase::He1f, self.z_he2_start)
        } else if z > self.z_he2_end {
            (Phase::He2, self.z_he2_end)
        } else if z > self.z_h_end {
            (Phase::H, self.z_h_end)
        } else if z > self.z_reio_start {
            (Phase::Frec, self.z_reio_start)
        } else {
            (Phase::Reio, 0.0)
        }
    }

    /// All phase boundary redshifts, in decreasing order, paired with the phase that starts at
    /// each (used by the evolver driver to carve up the integration intervals, §4.5).
    #[must_use]
    pub fn ordered_transitions(&self) -> [(Phase, f64); 6] {
        [
            (Phase::Brec, self.z_he1_start),
            (Phase::He1, self.z_he1_end),
            (Phase::He1f, self.z_he2_start),
            (Phase::He2, self.z_he2_end),
            (Phase::H, self.z_h_end),
            (Phase::Frec, self.z_reio_start),
        ]
    }
}

/// Smooth sigmoidal interpolator satisfying `w(0)=0, w(1)=1, w'(0)=w'(1)=0` (§4.4), the
/// classic smoothstep polynomial.
#[must_use]
pub fn smoothstep(s: f64) -> f64 {
    let s = s.clamp(0.0, 1.0);
    s * s * (3.0 - 2.0 * s)
}

/// Blends `x_old` (the value a now-superseded phase would have produced) into `x_new` across a
/// smoothing overlap of width `delta` redshift units past a phase transition at `z_transition`
/// (§4.4). Returns `x_new` unchanged once `z` has moved `delta` past the transition.
#[must_use]
pub fn blend_across_transition(z: f64, z_transition: f64, delta: f64, x_old: f64, x_new: f64) -> f64 {
    let distance_past = z_transition - z;
    if distance_past <= 0.0 {
        return x_old;
    }
    if distance_past >= delta {
        return x_new;
    }
    let s = distance_past / delta;
    let w = smoothstep(s);
    w.mul_add(x_new, (1.0 - w) * x_old)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn smoothstep_boundary_values() {
        assert_approx_eq!(f64, smoothstep(0.0), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, smoothstep(1.0), 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, smoothstep(0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn blend_reduces_to_endpoints() {
        assert_approx_eq!(
            f64,
            blend_across_transition(100.0, 100.0, 10.0, 1.0, 2.0),
            1.0,
            epsilon = 1e-12
        );
        assert_approx_eq!(
            f64,
            blend_across_transition(89.0, 100.0, 10.0, 1.0, 2.0),
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn phase_boundaries_are_ordered() {
        let precision = PrecisionParams::default();
        let boundaries = PhaseBoundaries::from_precision(&precision, 50.0);
        assert!(boundaries.z_he1_start > boundaries.z_he1_end);
        assert!(boundaries.z_he1_end > boundaries.z_he2_start);
        assert!(boundaries.z_he2_start > boundaries.z_he2_end);
        assert!(boundaries.z_he2_end > boundaries.z_h_end);
        assert!(boundaries.z_h_end > boundaries.z_reio_start);
    }

    #[test]
    fn phase_at_dispatches_correctly() {
        let precision = PrecisionParams::default();
        let boundaries = PhaseBoundaries::from_precision(&precision, 50.0);
        let (phase, _) = boundaries.phase_at(10.0);
        assert_eq!(phase, Phase::Reio);
        let (phase, _) = boundaries.phase_at(1.0e5);
        assert_eq!(phase, Phase::Brec);
    }
}
