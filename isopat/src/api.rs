//! * High level APIs for running label deconvolution operations
use tracing::debug;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::{
    error::{DeconvolutionError, PatternRole},
    isotopic_fit::{ConstrainedFitter, FitConfig},
    isotopic_model::{ForwardModel, LabelSpec, DEUTERIUM_SHIFT},
    isotopic_pattern::IsotopicPattern,
    scorer::aggregate,
    solution::DeconvolutionResult,
};

/// The labeling scheme and solver settings for a deconvolution
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeconvolutionParams {
    /// The largest number of label units a molecule may carry
    pub n_labels: i32,
    /// The nominal mass difference contributed by one label unit
    pub mass_shift: i32,
    /// The settings for the constrained solver
    pub fit: FitConfig,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            n_labels: 0,
            mass_shift: DEUTERIUM_SHIFT,
            fit: FitConfig::default(),
        }
    }
}

impl DeconvolutionParams {
    pub fn new(n_labels: i32, mass_shift: i32) -> Self {
        Self {
            n_labels,
            mass_shift,
            fit: FitConfig::default(),
        }
    }

    pub fn with_fit_config(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    /// Check the labeling parameters
    pub fn label_spec(&self) -> Result<LabelSpec, DeconvolutionError> {
        Ok(LabelSpec::new(self.n_labels, self.mass_shift)?)
    }
}

/// Holds a [`ForwardModel`] built once for an unlabeled pattern and labeling scheme,
/// and fits it against any number of measured patterns.
///
/// The model is only read after construction, so a single engine may be shared
/// between threads.
#[derive(Debug, Clone)]
pub struct DeconvolutionEngine {
    model: ForwardModel,
    fitter: ConstrainedFitter,
}

impl DeconvolutionEngine {
    /// Validate `unlabeled` and `params` and build the forward model
    pub fn new(unlabeled: &[f64], params: DeconvolutionParams) -> Result<Self, DeconvolutionError> {
        let unlabeled = IsotopicPattern::validate(unlabeled)
            .map_err(|e| DeconvolutionError::pattern(PatternRole::Unlabeled, e))?;
        let spec = params.label_spec()?;
        Ok(Self::from_model(
            ForwardModel::build(&unlabeled, spec),
            params.fit,
        ))
    }

    pub fn from_model(model: ForwardModel, fit: FitConfig) -> Self {
        Self {
            model,
            fitter: ConstrainedFitter::new(fit),
        }
    }

    pub fn model(&self) -> &ForwardModel {
        &self.model
    }

    pub fn fitter(&self) -> &ConstrainedFitter {
        &self.fitter
    }

    /// Deconvolve a single measured pattern
    pub fn deconvolve(&self, analyte: &[f64]) -> Result<DeconvolutionResult, DeconvolutionError> {
        let measured = IsotopicPattern::validate(analyte)
            .map_err(|e| DeconvolutionError::pattern(PatternRole::Analyte, e))?;
        self.deconvolve_pattern(&measured)
    }

    /// Deconvolve an already validated measured pattern
    pub fn deconvolve_pattern(
        &self,
        measured: &IsotopicPattern,
    ) -> Result<DeconvolutionResult, DeconvolutionError> {
        let outcome = self.fitter.fit(&self.model, measured)?;
        Ok(aggregate(outcome))
    }

    /// Deconvolve every measured pattern independently, in parallel when the
    /// `parallelism` feature is enabled.
    ///
    /// The `i`th entry of the output is the outcome for `analytes[i]`, and a failure
    /// for one pattern does not affect any other.
    #[tracing::instrument(level = "debug", skip_all, fields(n_analytes = analytes.len()))]
    pub fn deconvolve_each<A: AsRef<[f64]> + Sync>(
        &self,
        analytes: &[A],
    ) -> Vec<Result<DeconvolutionResult, DeconvolutionError>> {
        debug!("Deconvolving {} analytes", analytes.len());
        #[cfg(feature = "parallelism")]
        let results = analytes
            .par_iter()
            .map(|analyte| self.deconvolve(analyte.as_ref()))
            .collect();
        #[cfg(not(feature = "parallelism"))]
        let results = analytes
            .iter()
            .map(|analyte| self.deconvolve(analyte.as_ref()))
            .collect();
        results
    }

    /// Deconvolve every measured pattern, failing on the first (lowest index) pattern
    /// that cannot be deconvolved.
    ///
    /// # Errors
    /// [`DeconvolutionError::BatchItem`] carrying the failing position and its cause
    pub fn deconvolve_batch<A: AsRef<[f64]> + Sync>(
        &self,
        analytes: &[A],
    ) -> Result<Vec<DeconvolutionResult>, DeconvolutionError> {
        self.deconvolve_each(analytes)
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.map_err(|source| DeconvolutionError::BatchItem {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }
}

/// A single-shot deconvolution of `analyte` into the fractions of species carrying
/// `0..=n_labels` label units of `mass_shift` mass units each.
///
/// # Arguments
/// - `unlabeled`: The natural isotopic pattern of the unlabeled compound
/// - `analyte`: The measured pattern of the labeled mixture
/// - `n_labels`: The largest number of label units a molecule may carry
/// - `mass_shift`: The nominal mass difference of one label unit, `1` for deuterium and `2` for <sup>18</sup>O
///
/// # Note
/// If many patterns share the same unlabeled pattern and labeling scheme, use
/// [`batch_deconvolve`] or a [`DeconvolutionEngine`] to build the forward model once.
pub fn deconvolve(
    unlabeled: &[f64],
    analyte: &[f64],
    n_labels: i32,
    mass_shift: i32,
) -> Result<DeconvolutionResult, DeconvolutionError> {
    deconvolve_with_params(unlabeled, analyte, DeconvolutionParams::new(n_labels, mass_shift))
}

/// As [`deconvolve`], with explicit solver settings
pub fn deconvolve_with_params(
    unlabeled: &[f64],
    analyte: &[f64],
    params: DeconvolutionParams,
) -> Result<DeconvolutionResult, DeconvolutionError> {
    DeconvolutionEngine::new(unlabeled, params)?.deconvolve(analyte)
}

/// Deconvolve many measured patterns against one unlabeled pattern, building the forward
/// model once. Results are in the same order as `analytes`.
///
/// # Errors
/// Validation problems with `unlabeled` or the labeling parameters are returned directly.
/// A problem with any analyte fails the whole batch with [`DeconvolutionError::BatchItem`]
/// naming the lowest failing position. Use [`DeconvolutionEngine::deconvolve_each`] to
/// keep the successful results instead.
pub fn batch_deconvolve<A: AsRef<[f64]> + Sync>(
    unlabeled: &[f64],
    analytes: &[A],
    n_labels: i32,
    mass_shift: i32,
) -> Result<Vec<DeconvolutionResult>, DeconvolutionError> {
    batch_deconvolve_with_params(
        unlabeled,
        analytes,
        DeconvolutionParams::new(n_labels, mass_shift),
    )
}

/// As [`batch_deconvolve`], with explicit solver settings
pub fn batch_deconvolve_with_params<A: AsRef<[f64]> + Sync>(
    unlabeled: &[f64],
    analytes: &[A],
    params: DeconvolutionParams,
) -> Result<Vec<DeconvolutionResult>, DeconvolutionError> {
    DeconvolutionEngine::new(unlabeled, params)?.deconvolve_batch(analytes)
}
