//! Deconvolve the composite isotopic pattern of an isotope-labeled mixture into the
//! fractions of molecules carrying `0, 1, ..., n` label units.
//!
//! ```rust
//! use isopat::deconvolve;
//!
//! // A 20% 18O labeled sample of a compound with pattern [100, 5.5, 0.3]
//! let result = deconvolve(&[100.0, 5.5, 0.3], &[80.0, 4.4, 20.24, 1.1, 0.06], 1, 2).unwrap();
//! assert!((result.labeled_ratio - 0.2).abs() < 1e-6);
//! ```
pub mod api;
pub mod error;
pub mod isotopic_fit;
pub mod isotopic_model;
pub mod isotopic_pattern;
pub mod scorer;
pub mod solution;

pub use crate::api::{
    batch_deconvolve, batch_deconvolve_with_params, deconvolve, deconvolve_with_params,
    DeconvolutionEngine, DeconvolutionParams,
};
pub use crate::error::{DeconvolutionError, ParameterError, PatternError, PatternRole};
pub use crate::isotopic_fit::{ConstrainedFitter, FitConfig, FitStatus};
pub use crate::isotopic_model::{
    ForwardModel, LabelSpec, DEUTERIUM_SHIFT, HEAVY_OXYGEN_SHIFT,
};
pub use crate::isotopic_pattern::IsotopicPattern;
pub use crate::scorer::{labeled_ratio, r_squared};
pub use crate::solution::DeconvolutionResult;
