//! Reductions over price and return series.
//!
//! Every function fails explicitly instead of producing NaN or infinity.

use crate::error::{AnalyzerError, Result};

/// Weighted sum across columns per row: `Σ quantity[j] × columns[j][i]`.
///
/// Columns are accumulated in the order given, so two calls with the same
/// leading columns produce bit-identical partial sums.
pub fn weighted_sum(quantities: &[f64], columns: &[&[f64]]) -> Vec<f64> {
    let rows = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    (0..rows)
        .map(|i| {
            quantities
                .iter()
                .zip(columns)
                .fold(0.0, |acc, (q, column)| acc + q * column[i])
        })
        .collect()
}

/// Simple percentage change between consecutive values; one element shorter
/// than the input.
pub fn pct_change(prices: &[f64]) -> Result<Vec<f64>> {
    prices
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                return Err(AnalyzerError::undefined("percentage change from a zero price"));
            }
            Ok(w[1] / w[0] - 1.0)
        })
        .collect()
}

pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AnalyzerError::InsufficientHistory { observations: 0 });
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (sum of squared deviations divided by n).
pub fn population_std(values: &[f64]) -> Result<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Ok(variance.sqrt())
}

/// Most negative `price / running_peak - 1` over the series, or 0 when the
/// series never falls below its running peak.
pub fn max_drawdown(prices: &[f64]) -> Result<f64> {
    if prices.len() < 2 {
        return Err(AnalyzerError::InsufficientHistory {
            observations: prices.len(),
        });
    }

    let mut peak = prices[0];
    let mut max_drawdown = 0.0;
    for &price in prices {
        if price > peak {
            peak = price;
        }
        if peak == 0.0 {
            return Err(AnalyzerError::undefined("drawdown from a zero peak"));
        }
        let drawdown = price / peak - 1.0;
        if drawdown < max_drawdown {
            max_drawdown = drawdown;
        }
    }
    Ok(max_drawdown)
}
