/*! Constrained least-squares fitting of a [`ForwardModel`] against a measured pattern */
use std::fmt::Display;
use std::time::Duration;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::DeconvolutionError;
use crate::isotopic_model::{ForwardModel, TargetWindow};
use crate::isotopic_pattern::IsotopicPattern;

mod nnls;

use nnls::nonnegative_least_squares;

/// How the iterative solve ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitStatus {
    /// The optimality conditions were met within tolerance
    #[default]
    Converged,
    /// [`FitConfig::max_iterations`] ran out first
    IterationLimit,
    /// [`FitConfig::timeout`] elapsed first
    TimedOut,
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

impl Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::IterationLimit => write!(f, "iteration limit reached"),
            FitStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Parameters controlling the constrained solve
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FitConfig {
    /// The relative objective change, and the gradient magnitude, below which the
    /// solve is considered converged
    pub tolerance: f64,
    /// The largest number of variables the active-set solver may add before giving up.
    /// At least one is always added.
    pub max_iterations: usize,
    /// An optional wall-clock budget for a single fit, checked between iterations
    pub timeout: Option<Duration>,
    /// The weight of the extra row enforcing that the fractions sum to one, relative to
    /// the unit-sum scaled pattern
    pub constraint_weight: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 500,
            timeout: None,
            constraint_weight: 1e3,
        }
    }
}

impl FitConfig {
    pub fn new(tolerance: f64, max_iterations: usize, timeout: Option<Duration>) -> Self {
        Self {
            tolerance,
            max_iterations,
            timeout,
            ..Default::default()
        }
    }
}

/// The raw product of [`ConstrainedFitter::fit`]
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// Non-negative species fractions summing to one
    pub fractions: Vec<f64>,
    /// The composite pattern predicted by `fractions`, on the measured scale
    pub predicted: Vec<f64>,
    /// Measured minus predicted intensity for each model row, on the measured scale
    pub residuals: Vec<f64>,
    /// The measured pattern as it entered the fit
    pub window: TargetWindow,
    /// The number of outer solver iterations
    pub iterations: usize,
    pub status: FitStatus,
}

/// Solves `min ‖A·x − y‖²` subject to `x ≥ 0` and `Σx = 1`.
///
/// Both `A` and `y` are first scaled to unit sum so patterns on any intensity scale
/// can be compared. The sum constraint is enforced with a heavily weighted extra row
/// appended to a non-negative least squares problem, after which any round-off is
/// clipped and the fractions renormalized to sum to exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstrainedFitter {
    config: FitConfig,
}

impl ConstrainedFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    fn augment(&self, model: &ForwardModel, window: &TargetWindow) -> (DMatrix<f64>, DVector<f64>) {
        let n_rows = model.predicted_length();
        let n_cols = model.n_species();
        let weight = self.config.constraint_weight;

        let normalized = model.normalized_matrix();
        let design = DMatrix::from_fn(n_rows + 1, n_cols, |j, i| {
            if j < n_rows {
                normalized[(j, i)]
            } else {
                weight
            }
        });
        let target = DVector::from_fn(n_rows + 1, |j, _| {
            if j < n_rows {
                window.values[j]
            } else {
                weight
            }
        });
        (design, target)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn fit(
        &self,
        model: &ForwardModel,
        measured: &IsotopicPattern,
    ) -> Result<FitOutcome, DeconvolutionError> {
        let window = model.window(measured);
        let (design, target) = self.augment(model, &window);

        let solution = nonnegative_least_squares(&design, &target, &self.config);

        let clipped = solution.x.map(|v| v.max(0.0));
        let total = clipped.sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(DeconvolutionError::DegenerateSolution);
        }
        let fractions = clipped / total;

        let predicted_scaled = model.normalized_matrix() * &fractions;
        let predicted: Vec<f64> = predicted_scaled.iter().map(|v| v * window.scale).collect();
        let residuals: Vec<f64> = window
            .values
            .iter()
            .zip(predicted_scaled.iter())
            .map(|(y, p)| (y - p) * window.scale)
            .collect();

        if solution.status.is_converged() {
            debug!("Fit converged after {} iterations", solution.iterations);
        } else {
            warn!(
                "Fit did not converge ({}) after {} iterations, returning the best fractions found",
                solution.status, solution.iterations
            );
        }

        Ok(FitOutcome {
            fractions: fractions.iter().copied().collect(),
            predicted,
            residuals,
            window,
            iterations: solution.iterations,
            status: solution.status,
        })
    }
}
