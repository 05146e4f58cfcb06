//! Crate-wide error type.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An input lies outside its physically or numerically supported range, so computation
    /// cannot start (domain violation).
    #[error("domain violation: {0}")]
    Domain(String),
    /// An iterative procedure (the stiff evolver, the τ_reio bisection, a BBN-table lookup)
    /// failed to converge within its configured budget.
    #[error("convergence failure: {0}")]
    Convergence(String),
    /// A precondition that guards a division or a logarithm was violated before the operation
    /// that would have produced a `NaN` or infinity.
    #[error("numerical guard violated: {0}")]
    NumericalGuard(String),
    /// Error surfaced by the background-cosmology collaborator.
    #[error("background cosmology error: {0}")]
    Background(String),
    /// Error surfaced while reading or interpolating the BBN helium table.
    #[error("BBN helium table error: {0}")]
    Bbn(String),
    /// I/O failure while reading a configuration or table file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Constructs a [`Error::Domain`] from anything that can be displayed.
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    /// Constructs a [`Error::Convergence`] from anything that can be displayed.
    pub fn convergence(msg: impl Into<String>) -> Self {
        Self::Convergence(msg.into())
    }

    /// Constructs a [`Error::NumericalGuard`] from anything that can be displayed.
    pub fn guard(msg: impl Into<String>) -> Self {
        Self::NumericalGuard(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
