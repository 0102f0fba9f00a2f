//! Validated relative-intensity isotopic patterns at unit mass spacing
use std::ops::Index;

use crate::error::PatternError;

/// An ordered sequence of non-negative peak intensities where position `0` is the
/// monoisotopic peak and position `k` is the peak `k` mass units above it.
///
/// Intensities are usually expressed relative to the base peak (largest = 100), but
/// any positive scale is accepted. An [`IsotopicPattern`] can only be created through
/// [`IsotopicPattern::validate`], so it always holds at least one peak, no negative or
/// non-finite intensities, and at least one non-zero intensity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<f64>", into = "Vec<f64>"))]
pub struct IsotopicPattern {
    intensities: Box<[f64]>,
}

impl IsotopicPattern {
    /// Check that `intensities` describes a usable isotopic pattern and take
    /// a copy of it.
    ///
    /// The intensities are not renormalized.
    pub fn validate(intensities: &[f64]) -> Result<Self, PatternError> {
        if intensities.is_empty() {
            return Err(PatternError::Empty);
        }
        let mut any_signal = false;
        for (index, value) in intensities.iter().copied().enumerate() {
            if !value.is_finite() {
                return Err(PatternError::NonFiniteIntensity { index, value });
            }
            if value < 0.0 {
                return Err(PatternError::NegativeIntensity { index, value });
            }
            any_signal |= value > 0.0;
        }
        if !any_signal {
            return Err(PatternError::AllZero);
        }
        Ok(Self {
            intensities: intensities.into(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// Always `false`, kept for parity with [`IsotopicPattern::len`]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.intensities
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.intensities.iter()
    }

    /// The intensity `offset` mass units above the monoisotopic peak, treating positions
    /// past the end of the pattern as zero.
    #[inline]
    pub fn intensity_at(&self, offset: usize) -> f64 {
        self.intensities.get(offset).copied().unwrap_or_default()
    }

    /// The summed intensity of the pattern
    pub fn total_intensity(&self) -> f64 {
        self.intensities.iter().sum()
    }
}

impl Index<usize> for IsotopicPattern {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.intensities[index]
    }
}

impl AsRef<[f64]> for IsotopicPattern {
    fn as_ref(&self) -> &[f64] {
        self.as_slice()
    }
}

impl<'a> IntoIterator for &'a IsotopicPattern {
    type Item = &'a f64;

    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl TryFrom<&[f64]> for IsotopicPattern {
    type Error = PatternError;

    fn try_from(value: &[f64]) -> Result<Self, Self::Error> {
        Self::validate(value)
    }
}

impl TryFrom<Vec<f64>> for IsotopicPattern {
    type Error = PatternError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::validate(&value)
    }
}

impl From<IsotopicPattern> for Vec<f64> {
    fn from(value: IsotopicPattern) -> Self {
        value.intensities.into_vec()
    }
}
