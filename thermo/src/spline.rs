//! Minimal cubic-spline and quadrature primitives (§4.9).
//!
//! §1 treats spline/quadrature primitives as "assumed available as a library" and out of this
//! crate's hard-part scope; no such crate sits in the surrounding dependency stack, so this
//! module supplies the small amount of plumbing C7 and C8 need, deliberately kept free of
//! features neither component uses (no periodic boundary conditions, no multi-dimensional
//! splines beyond the bilinear case in [`crate::bbn`]).

use crate::convert::f64_from_usize;
use crate::error::{Error, Result};

/// A natural cubic spline of `y` over a strictly monotone (increasing or decreasing) abscissa
/// `x`, storing the second derivatives needed for evaluation.
#[derive(Clone, Debug)]
pub struct Spline {
    x: Vec<f64>,
    y: Vec<f64>,
    y2: Vec<f64>,
    increasing: bool,
}

/// Where to start the binary search for the bracketing interval (§4.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cursor {
    /// Search the whole abscissa from scratch.
    Normal,
    /// Resume from a caller-supplied index, for monotone sweeps over nearby queries.
    CloseBy(usize),
}

impl Spline {
    /// Fits a natural cubic spline (zero second derivative at both ends) through `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if fewer than two points are given or if `x` is not strictly
    /// monotone.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() || x.len() < 2 {
            return Err(Error::domain(
                "spline fit needs at least two points with matching abscissa/ordinate lengths",
            ));
        }

        let increasing = x[1] > x[0];
        for w in x.windows(2) {
            if increasing && w[1] <= w[0] || !increasing && w[1] >= w[0] {
                return Err(Error::domain("spline abscissa must be strictly monotone"));
            }
        }

        let n = x.len();
        let mut y2 = vec![0.0; n];
        let mut u = vec![0.0; n];

        for i in 1..n - 1 {
            let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
            let p = sig * y2[i - 1] + 2.0;
            y2[i] = (sig - 1.0) / p;
            let d2ydx2 = (y[i + 1] - y[i]) / (x[i + 1] - x[i])
                - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
            u[i] = (6.0 * d2ydx2 / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
        }

        for i in (0..n - 1).rev() {
            y2[i] = y2[i] * y2[i + 1] + u[i];
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            y2,
            increasing,
        })
    }

    /// Locates the bracketing interval `[i, i+1]` for `x0`, honoring `cursor`, and returns the
    /// index `i` to reuse as the next call's cursor hint.
    fn locate(&self, x0: f64, cursor: Cursor) -> usize {
        let n = self.x.len();
        let le = |a: f64, b: f64| if self.increasing { a <= b } else { a >= b };

        let start = match cursor {
            Cursor::Normal => {
                let mut lo = 0usize;
                let mut hi = n - 1;
                while hi - lo > 1 {
                    let mid = (lo + hi) / 2;
                    if le(self.x[mid], x0) {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                return lo;
            }
            Cursor::CloseBy(hint) => hint.min(n - 2),
        };

        let mut i = start;
        while i + 1 < n - 1 && le(self.x[i + 1], x0) {
            i += 1;
        }
        while i > 0 && !le(self.x[i], x0) {
            i -= 1;
        }
        i
    }

    /// Evaluates the spline at `x0`, returning the value and the index to pass back as
    /// [`Cursor::CloseBy`] on the next call.
    #[must_use]
    pub fn eval(&self, x0: f64, cursor: Cursor) -> (f64, usize) {
        let i = self.locate(x0, cursor);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - x0) / h;
        let b = (x0 - self.x[i]) / h;
        let value = a * self.y[i]
            + b * self.y[i + 1]
            + ((a.powi(3) - a) * self.y2[i] + (b.powi(3) - b) * self.y2[i + 1]) * h * h / 6.0;
        (value, i)
    }

    /// Evaluates the first derivative at `x0`.
    #[must_use]
    pub fn eval_prime(&self, x0: f64, cursor: Cursor) -> (f64, usize) {
        let i = self.locate(x0, cursor);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - x0) / h;
        let b = (x0 - self.x[i]) / h;
        let value = (self.y[i + 1] - self.y[i]) / h
            - (3.0 * a * a - 1.0) / 6.0 * h * self.y2[i]
            + (3.0 * b * b - 1.0) / 6.0 * h * self.y2[i + 1];
        (value, i)
    }

    /// Evaluates the piecewise-linear (secant) interpolant through the fitted points at `x0`,
    /// ignoring the cubic correction term. Used near a derivative discontinuity the cubic fit
    /// would otherwise smear across (§4.2, §4.8).
    #[must_use]
    pub fn eval_linear(&self, x0: f64, cursor: Cursor) -> (f64, usize) {
        let i = self.locate(x0, cursor);
        let h = self.x[i + 1] - self.x[i];
        let t = (x0 - self.x[i]) / h;
        (self.y[i] + t * (self.y[i + 1] - self.y[i]), i)
    }

    /// Evaluates the second derivative at `x0`; this is linear between nodes by construction.
    #[must_use]
    pub fn eval_second(&self, x0: f64, cursor: Cursor) -> (f64, usize) {
        let i = self.locate(x0, cursor);
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - x0) / h;
        let b = (x0 - self.x[i]) / h;
        (a * self.y2[i] + b * self.y2[i + 1], i)
    }

    /// Definite integral of the spline from `self.x[0]` to each grid point, returned as a
    /// vector aligned with the original abscissa (cumulative trapezoid-plus-cubic-correction
    /// integral, exact for the fitted cubic on each segment).
    #[must_use]
    pub fn cumulative_integral(&self) -> Vec<f64> {
        let n = self.x.len();
        let mut out = vec![0.0; n];
        for i in 0..n - 1 {
            let h = self.x[i + 1] - self.x[i];
            let seg = 0.5 * h * (self.y[i] + self.y[i + 1])
                - h.powi(3) / 24.0 * (self.y2[i] + self.y2[i + 1]);
            out[i + 1] = out[i] + seg;
        }
        out
    }

    /// The fitted abscissa.
    #[must_use]
    pub fn x(&self) -> &[f64] {
        &self.x
    }
}

/// Trapezoidal quadrature of `y` sampled at (not necessarily uniform) `x`.
#[must_use]
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

/// A uniform boxcar (moving-average) smoother of half-width `radius` samples, used by the
/// variation-rate post-processing step (§4.7 step 4). Boundary samples use a truncated window.
#[must_use]
pub fn boxcar_smooth(y: &[f64], radius: usize) -> Vec<f64> {
    if radius == 0 {
        return y.to_vec();
    }
    let n = y.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            let count = f64_from_usize(hi - lo + 1);
            y[lo..=hi].iter().sum::<f64>() / count
        })
        .collect()
}

/// Bilinear interpolation on a regular 2D grid (used by the BBN helium table, §6).
#[derive(Clone, Debug)]
pub struct BilinearGrid {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Row-major, `values[i * ys.len() + j]` is the value at `(xs[i], ys[j])`.
    values: Vec<f64>,
}

impl BilinearGrid {
    /// Builds a bilinear grid from strictly increasing `xs`/`ys` and a row-major `values`
    /// matrix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if the axes have fewer than two points or `values` has the
    /// wrong length.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if xs.len() < 2 || ys.len() < 2 {
            return Err(Error::domain("bilinear grid needs at least 2x2 points"));
        }
        if values.len() != xs.len() * ys.len() {
            return Err(Error::domain("bilinear grid value count mismatch"));
        }
        Ok(Self { xs, ys, values })
    }

    fn bracket(axis: &[f64], v: f64) -> Result<usize> {
        if v < axis[0] || v > axis[axis.len() - 1] {
            return Err(Error::domain(format!(
                "value {v} outside interpolation range [{}, {}]",
                axis[0],
                axis[axis.len() - 1]
            )));
        }
        let mut i = 0;
        while i + 2 < axis.len() && axis[i + 1] <= v {
            i += 1;
        }
        Ok(i)
    }

    /// Evaluates the grid at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if `(x, y)` lies outside the tabulated range.
    pub fn eval(&self, x: f64, y: f64) -> Result<f64> {
        let i = Self::bracket(&self.xs, x)?;
        let j = Self::bracket(&self.ys, y)?;
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[j], self.ys[j + 1]);
        let tx = (x - x0) / (x1 - x0);
        let ty = (y - y0) / (y1 - y0);

        let ny = self.ys.len();
        let v00 = self.values[i * ny + j];
        let v10 = self.values[(i + 1) * ny + j];
        let v01 = self.values[i * ny + j + 1];
        let v11 = self.values[(i + 1) * ny + j + 1];

        Ok(v00 * (1.0 - tx) * (1.0 - ty)
            + v10 * tx * (1.0 - ty)
            + v01 * (1.0 - tx) * ty
            + v11 * tx * ty)
    }
}
