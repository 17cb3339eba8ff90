use std::collections::HashMap;

use polars::prelude::*;
use time::Date;

use crate::error::{AnalyzerError, Result};
use crate::types::PriceSeries;

const DATE_COLUMN: &str = "date";

/// Adjusted-close prices for several identifiers on one shared, ascending
/// date axis. Only dates present in every source series survive alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    dates: Vec<Date>,
    identifiers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl PriceTable {
    /// Inner-joins the series on date and sorts the result ascending.
    pub fn align(series: &[PriceSeries]) -> Result<Self> {
        let mut identifiers: Vec<String> = Vec::new();
        let mut joined: Option<DataFrame> = None;

        for s in series {
            if identifiers.contains(&s.identifier) {
                continue;
            }
            let frame = series_frame(s)?;
            joined = Some(match joined {
                None => frame,
                Some(acc) => acc
                    .inner_join(&frame, [DATE_COLUMN], [DATE_COLUMN])
                    .map_err(|e| AnalyzerError::unavailable(&s.identifier, e))?,
            });
            identifiers.push(s.identifier.clone());
        }

        let Some(joined) = joined else {
            return Ok(Self::default());
        };
        let joined = joined
            .sort([DATE_COLUMN], false, false)
            .map_err(|e| AnalyzerError::unavailable(DATE_COLUMN, e))?;

        let table = Self::from_frame(&joined, identifiers)?;
        tracing::debug!(
            identifiers = table.identifiers.len(),
            rows = table.dates.len(),
            longest = series.iter().map(PriceSeries::len).max().unwrap_or(0),
            "aligned price table"
        );
        Ok(table)
    }

    fn from_frame(frame: &DataFrame, identifiers: Vec<String>) -> Result<Self> {
        let dates = frame
            .column(DATE_COLUMN)
            .and_then(|c| c.i32())
            .map_err(|e| AnalyzerError::unavailable(DATE_COLUMN, e))?
            .into_iter()
            .map(|day| {
                day.and_then(|d| Date::from_julian_day(d).ok())
                    .ok_or_else(|| AnalyzerError::unavailable(DATE_COLUMN, "invalid date"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::with_capacity(identifiers.len());
        for id in &identifiers {
            let prices = frame
                .column(id)
                .and_then(|c| c.f64())
                .map_err(|e| AnalyzerError::unavailable(id, e))?
                .into_iter()
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| AnalyzerError::unavailable(id, "missing price after alignment"))?;
            columns.push(prices);
        }

        Ok(Self {
            dates,
            identifiers,
            columns,
        })
    }

    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn column(&self, identifier: &str) -> Option<&[f64]> {
        self.identifiers
            .iter()
            .position(|id| id == identifier)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Prices of `series` on exactly this table's dates. Fails if any of
    /// those dates is missing from the series.
    pub fn reindex(&self, series: &PriceSeries) -> Result<Vec<f64>> {
        let by_date: HashMap<Date, f64> = series.points.iter().map(|p| (p.date, p.price)).collect();
        self.dates
            .iter()
            .map(|d| {
                by_date.get(d).copied().ok_or_else(|| {
                    AnalyzerError::unavailable(&series.identifier, format!("no price on {d}"))
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let dates: Vec<String> = self.dates.iter().map(Date::to_string).collect();
        let mut columns = vec![Series::new(DATE_COLUMN, dates)];
        for (id, prices) in self.identifiers.iter().zip(&self.columns) {
            columns.push(Series::new(id.as_str(), prices.as_slice()));
        }
        DataFrame::new(columns)
    }
}

fn series_frame(series: &PriceSeries) -> Result<DataFrame> {
    // last quote wins when a date repeats
    let mut by_date: Vec<(i32, f64)> = Vec::with_capacity(series.len());
    for p in &series.points {
        let day = p.date.to_julian_day();
        match by_date.last_mut() {
            Some(last) if last.0 == day => last.1 = p.price,
            _ => by_date.push((day, p.price)),
        }
    }
    let (days, prices): (Vec<i32>, Vec<f64>) = by_date.into_iter().unzip();
    df!(
        DATE_COLUMN => days,
        series.identifier.as_str() => prices
    )
    .map_err(|e| AnalyzerError::unavailable(&series.identifier, e))
}
