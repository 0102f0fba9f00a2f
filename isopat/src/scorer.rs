//! Fit quality and labeling summaries derived from a fitted fraction vector
use crate::isotopic_fit::FitOutcome;
use crate::isotopic_model::{isclose, ForwardModel};
use crate::isotopic_pattern::IsotopicPattern;
use crate::solution::DeconvolutionResult;

pub type ScoreType = f64;

/// The fraction of molecules carrying at least one label unit, `1 - fractions[0]`.
///
/// An empty fraction vector has no labeled molecules.
#[inline]
pub fn labeled_ratio(fractions: &[f64]) -> f64 {
    match fractions.first() {
        Some(unlabeled) => 1.0 - unlabeled,
        None => 0.0,
    }
}

/// The coefficient of determination of `predicted` against `observed`
///
/// ```math
/// R^2 = 1 - \frac{\sum_j (y_j - \hat{y}_j)^2}{\sum_j (y_j - \bar{y})^2}
/// ```
///
/// When `observed` is constant the ratio is undefined, so a perfect prediction scores
/// `1.0` and anything else `0.0`.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> ScoreType {
    let n = observed.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let observed = &observed[..n];
    let mean = observed.iter().sum::<f64>() / n as f64;

    let ss_res: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let ss_tot: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    let magnitude: f64 = observed.iter().map(|y| y * y).sum();

    if ss_tot <= f64::EPSILON * magnitude {
        if isclose(ss_res, 0.0, f64::EPSILON * magnitude.max(1.0)) {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Package a fit into a [`DeconvolutionResult`]. R² is computed over every model row,
/// including zero-padded ones.
pub fn aggregate(outcome: FitOutcome) -> DeconvolutionResult {
    let observed: Vec<f64> = outcome
        .window
        .values
        .iter()
        .map(|v| v * outcome.window.scale)
        .collect();
    let r_squared = r_squared(&observed, &outcome.predicted);
    let labeled_ratio = labeled_ratio(&outcome.fractions);

    DeconvolutionResult {
        fractions: outcome.fractions,
        labeled_ratio,
        r_squared,
        residuals: outcome.residuals,
        rows_used: outcome.window.rows_used,
        rows_dropped: outcome.window.rows_dropped,
        rows_padded: outcome.window.rows_padded,
        iterations: outcome.iterations,
        status: outcome.status,
    }
}

/// Score an arbitrary species fraction vector against `measured` without fitting.
///
/// A fraction vector with no positive mass predicts nothing and scores `0.0`.
///
/// # Panics
/// If a non-empty `fractions` does not hold exactly one entry per species of `model`.
pub fn score_fractions(
    fractions: &[f64],
    model: &ForwardModel,
    measured: &IsotopicPattern,
) -> ScoreType {
    let total: f64 = fractions.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return 0.0;
    }
    let window = model.window(measured);
    let column_total = model.column_total();
    let predicted: Vec<f64> = model
        .predict(fractions)
        .into_iter()
        .map(|v| v / (column_total * total))
        .collect();
    r_squared(window.values.as_slice(), &predicted)
}
