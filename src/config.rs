//! Analysis file loading and command-line overrides.
//!
//! ```toml
//! benchmark = "^GSPC"
//! start = "2016-01-01"
//! end = "2017-12-31"
//!
//! [basket]
//! AAPL = 50
//! AMZN = 1
//!
//! [[what_if]]
//! identifier = "AMZN"
//! shares = 3
//!
//! [provider]
//! timeout_secs = 30
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use time::{macros::format_description, Date};

use crate::types::{Basket, DateRange};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("invalid pair '{value}', expected TICKER=SHARES")]
    InvalidPair { value: String },

    #[error("missing required setting: {field}")]
    Missing { field: String },

    #[error(transparent)]
    Analyzer(#[from] crate::AnalyzerError),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WhatIf {
    pub identifier: String,
    pub shares: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderConfig {
    pub timeout_secs: Option<u64>,
}

/// Raw analysis settings, as read from a file and before overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    pub benchmark: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default)]
    pub basket: Basket,
    #[serde(default)]
    pub what_if: Vec<WhatIf>,
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Settings after merging, with every required field checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub basket: Basket,
    pub range: DateRange,
    pub benchmark: String,
    pub what_if: Vec<(String, i64)>,
    pub timeout_secs: Option<u64>,
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn resolve(self) -> Result<Analysis, ConfigError> {
        let start = parse_date(&self.start.ok_or_else(|| missing("start"))?)?;
        let end = parse_date(&self.end.ok_or_else(|| missing("end"))?)?;
        let benchmark = self.benchmark.ok_or_else(|| missing("benchmark"))?;
        if self.basket.is_empty() {
            return Err(missing("basket"));
        }

        Ok(Analysis {
            basket: self.basket,
            range: DateRange::new(start, end)?,
            benchmark,
            what_if: self
                .what_if
                .into_iter()
                .map(|w| (w.identifier, w.shares))
                .collect(),
            timeout_secs: self.provider.timeout_secs,
        })
    }
}

pub fn parse_date(value: &str) -> Result<Date, ConfigError> {
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| {
        ConfigError::InvalidDate {
            value: value.to_string(),
        }
    })
}

/// Parses `TICKER=SHARES`; shares may be negative.
pub fn parse_pair(value: &str) -> Result<(String, i64), ConfigError> {
    let invalid = || ConfigError::InvalidPair {
        value: value.to_string(),
    };
    let (ticker, shares) = value.split_once('=').ok_or_else(invalid)?;
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(invalid());
    }
    let shares = shares.trim().parse::<i64>().map_err(|_| invalid())?;
    Ok((ticker.to_string(), shares))
}

fn missing(field: &str) -> ConfigError {
    ConfigError::Missing {
        field: field.to_string(),
    }
}
