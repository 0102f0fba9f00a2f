use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use clap::{parser::ValueSource, ArgMatches, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Value},
    Figment,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tracing::{debug, info, warn};

use isopat::{
    DeconvolutionEngine, DeconvolutionError, DeconvolutionParams, DeconvolutionResult, FitConfig,
};

use crate::args::{OutputFormat, PatternArg};

#[derive(Debug, Error)]
pub enum IsoPatError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to read the command line: {0}")]
    ArgumentError(
        #[source]
        #[from]
        clap::Error,
    ),
    #[error("Failed to read the configuration: {0}")]
    ConfigError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Failed to write JSON output: {0}")]
    JSONError(
        #[source]
        #[from]
        serde_json::Error,
    ),
    #[error("Failed to build the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
    #[error(transparent)]
    DeconvolutionError(#[from] DeconvolutionError),
    #[error("No unlabeled pattern was provided")]
    MissingUnlabeled,
    #[error("No analyte patterns were provided, pass at least one with --analyte")]
    NoAnalytes,
}

/// Deconvolve the isotopic patterns of isotope-labeled mixtures.
///
/// Fit each measured analyte pattern as a non-negative mixture of copies of the
/// unlabeled pattern shifted by `0..=n_labels` label units, and report the fraction
/// of each labeled species.
#[derive(Parser, Debug, Deserialize, Serialize)]
#[command(author, version)]
#[serde(default)]
pub struct IsoPat {
    /// The natural isotopic pattern of the unlabeled compound as comma-separated intensities
    #[arg(value_name = "UNLABELED")]
    pub unlabeled: Option<PatternArg>,

    /// A measured isotopic pattern of a labeled mixture, may be repeated
    #[arg(short = 'a', long = "analyte", value_name = "INTENSITIES")]
    pub analytes: Vec<PatternArg>,

    /// The largest number of label units a molecule may carry
    #[arg(short = 'n', long = "n-labels", default_value_t = 0)]
    pub n_labels: i32,

    /// The nominal mass shift of one label unit, 1 for deuterium and 2 for 18O
    #[arg(short = 's', long = "mass-shift", default_value_t = 1)]
    pub mass_shift: i32,

    /// The path to write the report to, or if '-' is passed, write to STDOUT
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The report format
    #[arg(short = 'f', long = "format", default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `isopat.toml` in the working directory.
    /// Environment variables prefixed with `ISOPAT_` will be read too. Options given
    /// explicitly on the command line take precedence over all of these.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
    )]
    pub threads: i32,

    /// The largest number of solver iterations per analyte
    #[arg(long = "max-iterations", default_value_t = 500)]
    pub max_iterations: usize,

    /// The convergence tolerance of the solver
    #[arg(long = "tolerance", default_value_t = 1e-10)]
    pub tolerance: f64,

    /// A wall-clock budget for each analyte's fit, in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

impl Default for IsoPat {
    fn default() -> Self {
        let fit = FitConfig::default();
        Self {
            unlabeled: None,
            analytes: Vec::new(),
            n_labels: 0,
            mass_shift: isopat::DEUTERIUM_SHIFT,
            output_file: PathBuf::from("-"),
            format: OutputFormat::default(),
            log_file: None,
            config_file: None,
            threads: -1,
            max_iterations: fit.max_iterations,
            tolerance: fit.tolerance,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    unlabeled: &'a PatternArg,
    n_labels: i32,
    mass_shift: i32,
    results: &'a [DeconvolutionResult],
}

impl IsoPat {
    /// Read the arguments in `matches` layered over the configuration sources.
    ///
    /// From lowest to highest precedence: built-in defaults, `isopat.toml` in the working
    /// directory, `--config-file`, `ISOPAT_*` environment variables, and finally the
    /// options the user actually passed on the command line.
    pub fn from_layered_matches(matches: &ArgMatches) -> Result<Self, IsoPatError> {
        let args = Self::from_arg_matches(matches)?;
        let explicit = args.explicit_values(matches)?;
        debug!(
            "Options given on the command line: {}",
            explicit.keys().join(", ")
        );

        let mut config = Figment::new()
            .merge(Serialized::defaults(&args))
            .merge(Toml::file("isopat.toml"));
        if let Some(path) = args.config_file.as_ref() {
            config = config.merge(Toml::file_exact(path));
        }
        config = config
            .merge(Env::prefixed("ISOPAT_"))
            .merge(Serialized::defaults(explicit));
        Ok(config.extract()?)
    }

    /// The serialized values of the options whose value came from the command line
    /// rather than a clap default
    fn explicit_values(&self, matches: &ArgMatches) -> Result<Dict, IsoPatError> {
        let values = Value::serialize(self)?.into_dict().unwrap_or_default();
        let explicit = values
            .into_iter()
            .filter(|(key, _)| {
                matches.ids().any(|id| id.as_str() == key)
                    && matches.value_source(key) == Some(ValueSource::CommandLine)
            })
            .collect();
        Ok(explicit)
    }

    fn create_threadpool(&self) -> Result<rayon::ThreadPool, IsoPatError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    pub fn params(&self) -> DeconvolutionParams {
        DeconvolutionParams::new(self.n_labels, self.mass_shift).with_fit_config(FitConfig::new(
            self.tolerance,
            self.max_iterations,
            self.timeout_ms.map(Duration::from_millis),
        ))
    }

    fn unlabeled(&self) -> Result<&PatternArg, IsoPatError> {
        self.unlabeled.as_ref().ok_or(IsoPatError::MissingUnlabeled)
    }

    /// Deconvolve every analyte, stopping at the first one that cannot be deconvolved
    pub fn deconvolve(&self) -> Result<Vec<DeconvolutionResult>, IsoPatError> {
        let unlabeled = self.unlabeled()?;
        if self.analytes.is_empty() {
            return Err(IsoPatError::NoAnalytes);
        }
        let engine = DeconvolutionEngine::new(unlabeled.as_slice(), self.params())?;
        info!(
            "Deconvolving {} analytes with up to {} labels of +{}",
            self.analytes.len(),
            self.n_labels,
            self.mass_shift
        );

        let started = Instant::now();
        let results = self
            .create_threadpool()?
            .install(|| engine.deconvolve_batch(&self.analytes))?;
        let elapsed = started.elapsed();

        let n_unconverged = results.iter().filter(|r| !r.is_converged()).count();
        if n_unconverged > 0 {
            warn!("{n_unconverged} analytes did not converge");
        }
        info!("Elapsed Time: {:0.3?}", elapsed);
        Ok(results)
    }

    fn write_text<W: Write>(
        &self,
        mut writer: W,
        results: &[DeconvolutionResult],
    ) -> io::Result<()> {
        let species = (0..=self.n_labels.max(0)).map(|i| format!("f{i}")).join("\t");
        writeln!(
            writer,
            "analyte\t{species}\tlabeled_ratio\tr_squared\titerations\tstatus"
        )?;
        for (i, result) in results.iter().enumerate() {
            writeln!(
                writer,
                "{i}\t{}\t{:.4}\t{:.4}\t{}\t{}",
                result.fractions.iter().map(|f| format!("{f:.4}")).join("\t"),
                result.labeled_ratio,
                result.r_squared,
                result.iterations,
                result.status
            )?;
        }
        Ok(())
    }

    fn write_report<W: Write>(
        &self,
        mut writer: W,
        results: &[DeconvolutionResult],
    ) -> Result<(), IsoPatError> {
        match self.format {
            OutputFormat::Text => self.write_text(&mut writer, results)?,
            OutputFormat::Json => {
                let report = Report {
                    unlabeled: self.unlabeled()?,
                    n_labels: self.n_labels,
                    mass_shift: self.mass_shift,
                    results,
                };
                serde_json::to_writer_pretty(&mut writer, &report)?;
                writeln!(writer)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn main(&self) -> Result<(), IsoPatError> {
        info!(
            "isopat v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        let results = self.deconvolve()?;
        if self.output_file == PathBuf::from("-") {
            self.write_report(io::stdout().lock(), &results)
        } else {
            info!("Output: {}", self.output_file.display());
            let handle = io::BufWriter::new(fs::File::create(&self.output_file)?);
            self.write_report(handle, &results)
        }
    }
}
