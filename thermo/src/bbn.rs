//! BBN helium-table reader (§6).
//!
//! Reads a flat, whitespace-separated text file and exposes a bilinear-spline interpolator
//! `(omega_b, delta_n_eff) -> Y_He`. Only the interpolator's output is consumed elsewhere; the
//! raw triples are discarded once the grid is built.

use crate::error::{Error, Result};
use crate::spline::BilinearGrid;
use std::path::Path;

/// A parsed BBN helium table, ready to be queried.
#[derive(Clone, Debug)]
pub struct BbnTable {
    grid: BilinearGrid,
}

/// A comment line is any line whose first non-blank character has ASCII value `<= 39`
/// (covers `#`, `%`, and blank lines).
fn is_comment(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .map_or(true, |c| (c as u32) <= 39)
}

impl BbnTable {
    /// Parses a BBN table from its textual contents (§6 format).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bbn`] if the header or body is malformed.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents.lines().filter(|l| !is_comment(l));

        let header = lines
            .next()
            .ok_or_else(|| Error::Bbn("BBN table is empty".to_string()))?;
        let mut header_fields = header.split_whitespace();
        let n_omega: usize = header_fields
            .next()
            .ok_or_else(|| Error::Bbn("missing N_omega in BBN table header".to_string()))?
            .parse()
            .map_err(|e| Error::Bbn(format!("invalid N_omega: {e}")))?;
        let n_delta: usize = header_fields
            .next()
            .ok_or_else(|| Error::Bbn("missing N_delta in BBN table header".to_string()))?
            .parse()
            .map_err(|e| Error::Bbn(format!("invalid N_delta: {e}")))?;

        let mut omega = Vec::with_capacity(n_omega);
        let mut delta = Vec::with_capacity(n_delta);
        let mut values = vec![0.0; n_omega * n_delta];

        let mut count = 0usize;
        for line in lines {
            let mut fields = line.split_whitespace();
            let w: f64 = fields
                .next()
                .ok_or_else(|| Error::Bbn("missing omega_b field".to_string()))?
                .parse()
                .map_err(|e| Error::Bbn(format!("invalid omega_b: {e}")))?;
            let d: f64 = fields
                .next()
                .ok_or_else(|| Error::Bbn("missing delta_n_eff field".to_string()))?
                .parse()
                .map_err(|e| Error::Bbn(format!("invalid delta_n_eff: {e}")))?;
            let y: f64 = fields
                .next()
                .ok_or_else(|| Error::Bbn("missing Y_He field".to_string()))?
                .parse()
                .map_err(|e| Error::Bbn(format!("invalid Y_He: {e}")))?;

            // omega_b varies fastest (§6 format): count % n_omega indexes the omega axis,
            // count / n_omega indexes the delta_n_eff axis.
            let i = count / n_omega;
            let j = count % n_omega;
            if i == 0 {
                omega.push(w);
            }
            if j == 0 {
                delta.push(d);
            }
            values[j * n_delta + i] = y;
            count += 1;
        }

        if count != n_omega * n_delta {
            return Err(Error::Bbn(format!(
                "expected {} data rows, found {count}",
                n_omega * n_delta
            )));
        }

        let grid = BilinearGrid::new(omega, delta, values)
            .map_err(|e| Error::Bbn(format!("malformed BBN grid: {e}")))?;

        Ok(Self { grid })
    }

    /// Reads and parses a BBN table from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Bbn`] if its contents are
    /// malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Interpolates the primordial helium fraction at `(omega_b, delta_n_eff)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bbn`] if the point lies outside the tabulated range.
    pub fn y_he(&self, omega_b: f64, delta_n_eff: f64) -> Result<f64> {
        self.grid
            .eval(omega_b, delta_n_eff)
            .map_err(|e| Error::Bbn(format!("Y_He lookup out of range: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    const SAMPLE: &str = "\
# omega_b varies fastest
2 2
0.020 3.0 0.245
0.025 3.0 0.250
0.020 3.5 0.246
0.025 3.5 0.251
";

    #[test]
    fn parses_and_interpolates() {
        let table = BbnTable::parse(SAMPLE).unwrap();
        let y = table.y_he(0.0225, 3.25).unwrap();
        assert_approx_eq!(f64, y, 0.248, epsilon = 1e-6);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let table = BbnTable::parse(SAMPLE).unwrap();
        assert!(table.y_he(0.1, 3.0).is_err());
    }

    #[test]
    fn blank_and_percent_comment_lines_are_skipped() {
        let with_comments = format!("%comment\n\n{SAMPLE}");
        let table = BbnTable::parse(&with_comments).unwrap();
        assert_approx_eq!(
            f64,
            table.y_he(0.020, 3.0).unwrap(),
            0.245,
            epsilon = 1e-12
        );
    }
}
