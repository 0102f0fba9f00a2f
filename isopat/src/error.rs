/*! Errors that may arise while validating inputs or deconvolving a pattern */
use std::fmt::Display;

use thiserror::Error;

/// Why an intensity vector is not a usable isotopic pattern
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    #[error("The isotopic pattern is empty")]
    Empty,
    #[error("The isotopic pattern has a negative intensity {value} at position {index}")]
    NegativeIntensity { index: usize, value: f64 },
    #[error("The isotopic pattern has a non-finite intensity {value} at position {index}")]
    NonFiniteIntensity { index: usize, value: f64 },
    #[error("The isotopic pattern has no non-zero intensity")]
    AllZero,
}

/// Why a labeling specification cannot be used to build a forward model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("The number of labels must be non-negative, got {0}")]
    NegativeLabelCount(i32),
    #[error("The mass shift per label must be at least 1, got {0}")]
    NonPositiveMassShift(i32),
}

/// Which input an [`PatternError`] was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRole {
    /// The natural isotopic pattern of the unlabeled compound
    Unlabeled,
    /// A measured pattern of a labeled mixture
    Analyte,
}

impl Display for PatternRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternRole::Unlabeled => write!(f, "unlabeled"),
            PatternRole::Analyte => write!(f, "analyte"),
        }
    }
}

/// An error that might occur during deconvolution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeconvolutionError {
    #[error("Invalid {role} pattern: {source}")]
    InvalidPattern {
        role: PatternRole,
        #[source]
        source: PatternError,
    },
    #[error("Invalid labeling parameter: {0}")]
    InvalidParameter(
        #[source]
        #[from]
        ParameterError,
    ),
    #[error("Failed to deconvolve analyte {index} of the batch: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<DeconvolutionError>,
    },
    #[error("The fitted fraction vector has no mass to normalize")]
    DegenerateSolution,
}

impl DeconvolutionError {
    pub(crate) fn pattern(role: PatternRole, source: PatternError) -> Self {
        Self::InvalidPattern { role, source }
    }

    /// The position of the failing analyte if this error came from a batch
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            Self::BatchItem { index, .. } => Some(*index),
            _ => None,
        }
    }
}
