//! Lawson-Hanson active-set non-negative least squares
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use super::{FitConfig, FitStatus};

/// Passive variables at or below this value are returned to the active set
const ZERO_TOLERANCE: f64 = 1e-14;

#[derive(Debug, Clone)]
pub(crate) struct NonNegativeSolution {
    pub x: DVector<f64>,
    pub iterations: usize,
    pub status: FitStatus,
}

/// Least-squares solve of `a[:, passive] * z = b`, scattered back into a vector with zeros
/// for the variables that are not passive.
fn solve_passive(a: &DMatrix<f64>, b: &DVector<f64>, passive: &[bool]) -> DVector<f64> {
    let columns: Vec<usize> = passive
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.then_some(i))
        .collect();
    let mut solution = DVector::zeros(a.ncols());
    if columns.is_empty() {
        return solution;
    }

    let sub = a.select_columns(&columns);
    let dim = sub.nrows().max(sub.ncols()) as f64;
    let svd = sub.svd(true, true);
    let eps = f64::EPSILON * dim * svd.singular_values.max();
    // Only fails when the singular vectors were not computed
    let z = svd
        .solve(b, eps)
        .unwrap_or_else(|_| DVector::zeros(columns.len()));
    for (k, i) in columns.into_iter().enumerate() {
        solution[i] = z[k];
    }
    solution
}

/// Minimize `‖a·x − b‖²` subject to `x ≥ 0`.
///
/// Terminates when no inactive variable has a gradient above the dual tolerance, when an
/// outer iteration improves the objective by less than `config.tolerance` relative to the
/// previous one, or when the iteration or time budget of `config` runs out. At least one
/// iteration is always taken.
pub(crate) fn nonnegative_least_squares(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    config: &FitConfig,
) -> NonNegativeSolution {
    let started = Instant::now();
    let n = a.ncols();
    let at = a.transpose();

    let atb = &at * b;
    let dual_tolerance = config
        .tolerance
        .max(f64::EPSILON * a.nrows() as f64 * atb.amax());

    let mut x = DVector::zeros(n);
    let mut passive = vec![false; n];
    let mut objective = b.norm_squared();
    let mut iterations = 0;

    let status = loop {
        let gradient = &at * (b - a * &x);
        let candidate = (0..n)
            .filter(|j| !passive[*j])
            .max_by(|i, j| gradient[*i].total_cmp(&gradient[*j]))
            .filter(|j| gradient[*j] > dual_tolerance);

        let Some(entering) = candidate else {
            break FitStatus::Converged;
        };

        // The first variable always enters so there is a solution to report
        if iterations > 0 {
            if iterations >= config.max_iterations {
                break FitStatus::IterationLimit;
            }
            if let Some(timeout) = config.timeout {
                if started.elapsed() > timeout {
                    break FitStatus::TimedOut;
                }
            }
        }
        iterations += 1;
        passive[entering] = true;
        trace!("Iteration {iterations}: variable {entering} enters with gradient {}", gradient[entering]);

        // Each pass removes at least one passive variable, so `n` passes suffice
        for _ in 0..=n {
            let s = solve_passive(a, b, &passive);
            let step = (0..n)
                .filter(|i| passive[*i] && s[*i] <= 0.0)
                .map(|i| {
                    let denominator = x[i] - s[i];
                    if denominator <= 0.0 {
                        0.0
                    } else {
                        x[i] / denominator
                    }
                })
                .min_by(|p, q| p.total_cmp(q));

            match step {
                None => {
                    x = s;
                    break;
                }
                Some(alpha) => {
                    x += (s - &x) * alpha;
                    for i in 0..n {
                        if passive[i] && x[i] <= ZERO_TOLERANCE {
                            passive[i] = false;
                            x[i] = 0.0;
                        }
                    }
                }
            }
        }

        let next_objective = (b - a * &x).norm_squared();
        let change = (objective - next_objective).abs() / objective.max(f64::MIN_POSITIVE);
        objective = next_objective;
        if change < config.tolerance {
            trace!("Objective stalled at {objective:e}");
            break FitStatus::Converged;
        }
    };

    NonNegativeSolution {
        x,
        iterations,
        status,
    }
}
