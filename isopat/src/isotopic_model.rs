/*! The linear forward model mapping label-species fractions to a composite isotopic pattern */
use nalgebra::{DMatrix, DVector};
use num_traits::Float;
use tracing::debug;

use crate::error::ParameterError;
use crate::isotopic_pattern::IsotopicPattern;

pub(crate) fn isclose<T: Float>(a: T, b: T, delta: T) -> bool {
    (a - b).abs() < delta
}

/// The mass difference of a single deuterium-for-hydrogen exchange, in nominal mass units
pub const DEUTERIUM_SHIFT: i32 = 1;
/// The mass difference of a single <sup>18</sup>O-for-<sup>16</sup>O exchange, in nominal mass units
pub const HEAVY_OXYGEN_SHIFT: i32 = 2;

/// Describes how many label units a molecule may carry and how far each one
/// moves the isotopic envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelSpec {
    n_labels: usize,
    mass_shift: usize,
}

impl Default for LabelSpec {
    fn default() -> Self {
        Self {
            n_labels: 0,
            mass_shift: DEUTERIUM_SHIFT as usize,
        }
    }
}

impl LabelSpec {
    /// Create a new [`LabelSpec`]
    ///
    /// # Arguments
    /// - `n_labels`: The largest number of label units a molecule may carry, so species `0..=n_labels` are modeled
    /// - `mass_shift`: The nominal mass difference contributed by one label unit
    pub fn new(n_labels: i32, mass_shift: i32) -> Result<Self, ParameterError> {
        if n_labels < 0 {
            return Err(ParameterError::NegativeLabelCount(n_labels));
        }
        if mass_shift < 1 {
            return Err(ParameterError::NonPositiveMassShift(mass_shift));
        }
        Ok(Self {
            n_labels: n_labels as usize,
            mass_shift: mass_shift as usize,
        })
    }

    #[inline]
    pub fn n_labels(&self) -> usize {
        self.n_labels
    }

    #[inline]
    pub fn mass_shift(&self) -> usize {
        self.mass_shift
    }

    /// The number of distinct label species, `n_labels + 1`
    #[inline]
    pub fn n_species(&self) -> usize {
        self.n_labels + 1
    }

    /// The number of positions needed to hold the most heavily labeled copy of
    /// a pattern `unlabeled_len` peaks long
    #[inline]
    pub fn predicted_length(&self, unlabeled_len: usize) -> usize {
        unlabeled_len + self.n_labels * self.mass_shift
    }
}

/// The measured pattern cut or padded to the rows of a [`ForwardModel`] and scaled
/// to unit sum.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWindow {
    /// The scaled intensities, one per forward model row
    pub values: DVector<f64>,
    /// The summed intensity of the measured rows that were kept, used to map back to the
    /// measured scale. `1.0` if the kept rows hold no signal.
    pub scale: f64,
    /// How many measured peaks fell inside the model's rows
    pub rows_used: usize,
    /// How many measured peaks lay past the last model row and were dropped
    pub rows_dropped: usize,
    /// How many model rows had no measured peak and were treated as zero
    pub rows_padded: usize,
}

/// A matrix of shape `predicted_length × (n_labels + 1)` whose column `i` is the
/// unlabeled pattern shifted up by `i * mass_shift` positions.
///
/// Multiplying it by a vector of species fractions predicts the composite pattern
/// of that mixture. It depends only on the unlabeled pattern and the [`LabelSpec`],
/// so one instance can be shared read-only across any number of fits.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardModel {
    matrix: DMatrix<f64>,
    spec: LabelSpec,
    unlabeled: IsotopicPattern,
}

impl ForwardModel {
    #[tracing::instrument(level = "debug", skip(unlabeled))]
    pub fn build(unlabeled: &IsotopicPattern, spec: LabelSpec) -> Self {
        let n_rows = spec.predicted_length(unlabeled.len());
        let n_cols = spec.n_species();
        let mut matrix = DMatrix::zeros(n_rows, n_cols);
        for species in 0..n_cols {
            let offset = species * spec.mass_shift();
            for (j, intensity) in unlabeled.iter().enumerate() {
                matrix[(offset + j, species)] = *intensity;
            }
        }
        debug!("Built a {n_rows}x{n_cols} forward model");
        Self {
            matrix,
            spec,
            unlabeled: unlabeled.clone(),
        }
    }

    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    #[inline]
    pub fn spec(&self) -> LabelSpec {
        self.spec
    }

    #[inline]
    pub fn unlabeled(&self) -> &IsotopicPattern {
        &self.unlabeled
    }

    /// The number of rows in the model
    #[inline]
    pub fn predicted_length(&self) -> usize {
        self.matrix.nrows()
    }

    /// The number of label species, one per column
    #[inline]
    pub fn n_species(&self) -> usize {
        self.matrix.ncols()
    }

    /// The sum of every column, identical for all of them
    #[inline]
    pub fn column_total(&self) -> f64 {
        self.unlabeled.total_intensity()
    }

    /// The model with every column scaled to unit sum
    pub fn normalized_matrix(&self) -> DMatrix<f64> {
        &self.matrix / self.column_total()
    }

    /// Predict the composite pattern of a mixture with the given species `fractions`,
    /// on the scale of the unlabeled pattern.
    ///
    /// # Panics
    /// If `fractions` does not hold exactly one entry per species.
    pub fn predict(&self, fractions: &[f64]) -> Vec<f64> {
        assert_eq!(
            fractions.len(),
            self.n_species(),
            "Expected one fraction per label species"
        );
        let x = DVector::from_column_slice(fractions);
        (&self.matrix * x).iter().copied().collect()
    }

    /// Cut or zero-extend `measured` to the rows of this model and scale it to unit sum.
    pub fn window(&self, measured: &IsotopicPattern) -> TargetWindow {
        let n_rows = self.predicted_length();
        let rows_used = measured.len().min(n_rows);
        let rows_dropped = measured.len() - rows_used;
        let rows_padded = n_rows - rows_used;
        if rows_dropped > 0 {
            debug!("Dropping {rows_dropped} measured peaks past the {n_rows} modeled positions");
        }

        let mut values = DVector::from_fn(n_rows, |j, _| measured.intensity_at(j));
        let total = values.sum();
        let scale = if total > 0.0 { total } else { 1.0 };
        values /= scale;
        TargetWindow {
            values,
            scale,
            rows_used,
            rows_dropped,
            rows_padded,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn hd_unlabeled() -> IsotopicPattern {
        IsotopicPattern::validate(&[100.0, 8.88, 0.37]).unwrap()
    }

    #[test]
    fn test_label_spec() {
        let spec = LabelSpec::new(4, 1).unwrap();
        assert_eq!(spec.n_species(), 5);
        assert_eq!(spec.predicted_length(3), 7);
        assert_eq!(
            LabelSpec::new(-1, 1),
            Err(ParameterError::NegativeLabelCount(-1))
        );
        assert_eq!(
            LabelSpec::new(2, 0),
            Err(ParameterError::NonPositiveMassShift(0))
        );
        assert_eq!(LabelSpec::default().mass_shift(), 1);
    }

    #[test]
    fn test_build_shape() {
        let model = ForwardModel::build(&hd_unlabeled(), LabelSpec::new(4, 1).unwrap());
        assert_eq!(model.predicted_length(), 7);
        assert_eq!(model.n_species(), 5);
        for species in 0..5 {
            let column = model.matrix().column(species);
            assert!(isclose(column.sum(), 109.25, 1e-9));
            assert_eq!(column[species], 100.0);
            assert_eq!(column[species + 1], 8.88);
            assert_eq!(column[species + 2], 0.37);
        }
        assert_eq!(model.matrix()[(0, 1)], 0.0);
        assert_eq!(model.matrix()[(6, 3)], 0.0);
    }

    #[test]
    fn test_mass_shift_spacing() {
        let unlabeled = IsotopicPattern::validate(&[100.0, 5.5, 0.3]).unwrap();
        let model = ForwardModel::build(
            &unlabeled,
            LabelSpec::new(1, HEAVY_OXYGEN_SHIFT).unwrap(),
        );
        assert_eq!(model.predicted_length(), 5);
        let light: Vec<f64> = model.matrix().column(0).iter().copied().collect();
        let heavy: Vec<f64> = model.matrix().column(1).iter().copied().collect();
        assert_eq!(light, vec![100.0, 5.5, 0.3, 0.0, 0.0]);
        assert_eq!(heavy, vec![0.0, 0.0, 100.0, 5.5, 0.3]);
    }

    #[test]
    fn test_zero_labels() {
        let model = ForwardModel::build(&hd_unlabeled(), LabelSpec::new(0, 3).unwrap());
        assert_eq!(model.predicted_length(), 3);
        assert_eq!(model.n_species(), 1);
    }

    #[test]
    fn test_predict() {
        let unlabeled = IsotopicPattern::validate(&[100.0, 5.5, 0.3]).unwrap();
        let model = ForwardModel::build(&unlabeled, LabelSpec::new(1, 2).unwrap());
        let predicted = model.predict(&[0.8, 0.2]);
        let expected = [80.0, 4.4, 20.24, 1.1, 0.06];
        for (p, e) in predicted.iter().zip(expected) {
            assert!(isclose(*p, e, 1e-9), "{p} != {e}");
        }
    }

    #[test]
    fn test_window() {
        let model = ForwardModel::build(&hd_unlabeled(), LabelSpec::new(1, 1).unwrap());

        let short = IsotopicPattern::validate(&[50.0, 50.0]).unwrap();
        let window = model.window(&short);
        assert_eq!(window.values.len(), 4);
        assert_eq!(window.rows_used, 2);
        assert_eq!(window.rows_padded, 2);
        assert_eq!(window.rows_dropped, 0);
        assert_eq!(window.scale, 100.0);
        assert_eq!(window.values.as_slice(), &[0.5, 0.5, 0.0, 0.0]);

        let long = IsotopicPattern::validate(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]).unwrap();
        let window = model.window(&long);
        assert_eq!(window.rows_used, 4);
        assert_eq!(window.rows_dropped, 2);
        assert_eq!(window.rows_padded, 0);
        assert_eq!(window.scale, 100.0);
    }

    #[test]
    fn test_window_without_signal() {
        let model = ForwardModel::build(&hd_unlabeled(), LabelSpec::new(0, 1).unwrap());
        let measured = IsotopicPattern::validate(&[0.0, 0.0, 0.0, 5.0]).unwrap();
        let window = model.window(&measured);
        assert_eq!(window.scale, 1.0);
        assert_eq!(window.rows_dropped, 1);
        assert_eq!(window.values.sum(), 0.0);
    }
}
