use std::fmt::Display;

use itertools::Itertools;

use crate::isotopic_fit::FitStatus;
use crate::scorer::ScoreType;

/// The composition of a labeled mixture recovered from one measured pattern.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeconvolutionResult {
    /// The mole fraction of molecules carrying exactly `i` label units, each non-negative
    /// and summing to one
    pub fractions: Vec<f64>,
    /// The fraction of molecules carrying at least one label unit, `1 - fractions[0]`
    pub labeled_ratio: f64,
    /// The share of the measured pattern's variance explained by the fit
    pub r_squared: ScoreType,
    /// Measured minus predicted intensity at each modeled position, on the measured scale
    pub residuals: Vec<f64>,
    /// How many measured peaks fell inside the modeled positions and entered the fit
    pub rows_used: usize,
    /// How many measured peaks lay past the modeled positions and were dropped
    pub rows_dropped: usize,
    /// How many modeled positions had no measured peak and were fit as zero intensity.
    /// The fit, residuals, and R² cover `rows_used + rows_padded` positions.
    pub rows_padded: usize,
    /// The number of solver iterations taken
    pub iterations: usize,
    pub status: FitStatus,
}

impl DeconvolutionResult {
    /// Whether the solver met its convergence criteria. When this is `false`,
    /// the fractions are the best found within the iteration or time budget.
    #[inline]
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// The largest number of label units modeled
    #[inline]
    pub fn n_labels(&self) -> usize {
        self.fractions.len().saturating_sub(1)
    }

    /// The number of pattern positions the fit was evaluated over
    #[inline]
    pub fn rows_fitted(&self) -> usize {
        self.rows_used + self.rows_padded
    }

    #[inline]
    pub fn fraction(&self, n_labels: usize) -> Option<f64> {
        self.fractions.get(n_labels).copied()
    }

    /// The mean number of label units per molecule
    pub fn mean_label_count(&self) -> f64 {
        self.fractions
            .iter()
            .enumerate()
            .map(|(i, f)| i as f64 * f)
            .sum()
    }
}

impl Display for DeconvolutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeconvolutionResult(fractions=[{}], labeled_ratio={:.4}, r_squared={:.4}",
            self.fractions.iter().map(|v| format!("{v:.4}")).join(", "),
            self.labeled_ratio,
            self.r_squared
        )?;
        if !self.is_converged() {
            write!(f, ", status={}", self.status)?;
        }
        write!(f, ")")
    }
}
