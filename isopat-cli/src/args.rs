use std::{fmt::Display, num::ParseFloatError, str::FromStr};

use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An intensity vector written as a comma-separated list, e.g. `100,8.88,0.37`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternArg(pub Vec<f64>);

impl PatternArg {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl AsRef<[f64]> for PatternArg {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternParseError {
    #[error("The pattern has no intensities")]
    Empty,
    #[error("Failed to parse intensity {index} of the pattern `{token}`: {source}")]
    MalformedIntensity {
        index: usize,
        token: String,
        #[source]
        source: ParseFloatError,
    },
}

impl FromStr for PatternArg {
    type Err = PatternParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PatternParseError::Empty);
        }
        let values = s
            .split(',')
            .map(str::trim)
            .enumerate()
            .map(|(index, token)| {
                token
                    .parse()
                    .map_err(|source| PatternParseError::MalformedIntensity {
                        index,
                        token: token.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(Self(values))
    }
}

impl Display for PatternArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    /// A tab-separated table with one row per analyte
    Text,
    /// A JSON document holding the parameters and every result
    Json,
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
