use polars::prelude::*;
use serde::Serialize;
use time::Date;

use crate::error::{AnalyzerError, Result};
use crate::provider::{PriceProvider, YahooProvider};
use crate::stats;
use crate::table::PriceTable;
use crate::types::{Basket, DateRange};

/// Risk/return analysis of a fixed basket over a historical range.
///
/// All series are computed once at construction. Queries never mutate the
/// portfolio; what-if trades work on a local copy of the basket quantities.
pub struct Portfolio<P: PriceProvider> {
    basket: Basket,
    range: DateRange,
    benchmark: String,
    provider: P,
    prices: PriceTable,
    portfolio_prices: Vec<f64>,
    // a zero price fails only the statistics that divide by it
    portfolio_returns: Result<Vec<f64>>,
    benchmark_observations: usize,
    benchmark_returns: Result<Vec<f64>>,
}

impl<P: PriceProvider> std::fmt::Debug for Portfolio<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Portfolio {{ holdings: {}, range: {}, benchmark: {}, observations: {} }}",
            self.basket.len(),
            self.range,
            self.benchmark,
            self.prices.len()
        )
    }
}

impl Portfolio<YahooProvider> {
    /// Starts a builder; the provider is chosen by [`PortfolioBuilder::build`].
    pub fn builder() -> PortfolioBuilder {
        PortfolioBuilder::new()
    }
}

impl<P: PriceProvider> Portfolio<P> {
    pub fn new(basket: Basket, range: DateRange, benchmark: &str, provider: P) -> Result<Self> {
        if basket.is_empty() {
            return Err(AnalyzerError::EmptyBasket);
        }
        for holding in basket.iter().filter(|h| h.quantity == 0) {
            tracing::warn!(identifier = %holding.identifier, "holding has zero quantity");
        }

        let prices = provider.fetch(&basket.identifiers(), &range)?;
        let columns = basket_columns(&prices, &basket)?;
        let (portfolio_prices, portfolio_returns) = aggregate(&basket.quantities(), &columns);

        let benchmark_prices = provider.fetch_single(benchmark, &range)?.prices();
        let benchmark_returns = stats::pct_change(&benchmark_prices);

        tracing::info!(
            holdings = basket.len(),
            observations = prices.len(),
            benchmark,
            %range,
            "portfolio constructed"
        );

        Ok(Self {
            basket,
            range,
            benchmark: benchmark.to_string(),
            provider,
            prices,
            portfolio_prices,
            portfolio_returns,
            benchmark_observations: benchmark_prices.len(),
            benchmark_returns,
        })
    }

    pub fn basket(&self) -> &Basket {
        &self.basket
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn dates(&self) -> &[Date] {
        self.prices.dates()
    }

    /// Aligned adjusted-close prices of every holding.
    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    pub fn portfolio_prices(&self) -> &[f64] {
        &self.portfolio_prices
    }

    /// Fails with `DivisionUndefined` if a portfolio price used as a
    /// denominator is zero.
    pub fn portfolio_returns(&self) -> Result<&[f64]> {
        self.portfolio_returns.as_deref().map_err(Clone::clone)
    }

    pub fn benchmark_returns(&self) -> Result<&[f64]> {
        self.benchmark_returns.as_deref().map_err(Clone::clone)
    }

    fn returns(&self) -> Result<&[f64]> {
        let returns = self.portfolio_returns()?;
        if returns.is_empty() {
            return Err(AnalyzerError::InsufficientHistory {
                observations: self.prices.len(),
            });
        }
        Ok(returns)
    }

    pub fn average_daily_return(&self) -> Result<f64> {
        stats::mean(self.returns()?)
    }

    pub fn volatility(&self) -> Result<f64> {
        stats::population_std(self.returns()?)
    }

    /// Portfolio volatility over benchmark volatility.
    pub fn risk_ratio(&self) -> Result<f64> {
        let volatility = self.volatility()?;
        let benchmark_returns = self.benchmark_returns()?;
        if benchmark_returns.is_empty() {
            return Err(AnalyzerError::InsufficientHistory {
                observations: self.benchmark_observations,
            });
        }
        let benchmark_volatility = stats::population_std(benchmark_returns)?;
        if benchmark_volatility == 0.0 {
            return Err(AnalyzerError::undefined("risk ratio against a constant benchmark"));
        }
        Ok(volatility / benchmark_volatility)
    }

    /// Current volatility minus the volatility after adding `share_delta`
    /// shares of `identifier`. Positive means the trade lowers volatility.
    ///
    /// A held identifier is repriced from the cached table. An unheld one is
    /// fetched once and must have a price on every cached date.
    pub fn marginal_volatility(&self, identifier: &str, share_delta: i64) -> Result<f64> {
        let current = self.volatility()?;

        let extra: Vec<f64>;
        let mut quantities = self.basket.quantities();
        let mut columns = basket_columns(&self.prices, &self.basket)?;
        match self.basket.position(identifier) {
            Some(idx) => quantities[idx] += share_delta as f64,
            None => {
                let series = self.provider.fetch_single(identifier, &self.range)?;
                extra = self.prices.reindex(&series)?;
                quantities.push(share_delta as f64);
                columns.push(&extra);
            }
        }

        let (_, returns) = aggregate(&quantities, &columns);
        let hypothetical = stats::population_std(&returns?)?;
        tracing::info!(
            identifier,
            share_delta,
            current,
            hypothetical,
            "marginal volatility"
        );
        Ok(current - hypothetical)
    }

    /// Largest peak-to-trough decline of the portfolio price, as a value <= 0.
    pub fn max_drawdown(&self) -> Result<f64> {
        stats::max_drawdown(&self.portfolio_prices)
    }

    pub fn summary(&self) -> Result<RiskSummary> {
        Ok(RiskSummary {
            start: self.range.start().to_string(),
            end: self.range.end().to_string(),
            benchmark: self.benchmark.clone(),
            holdings: self.basket.len(),
            observations: self.prices.len(),
            average_daily_return: self.average_daily_return()?,
            volatility: self.volatility()?,
            risk_ratio: self.risk_ratio()?,
            max_drawdown: self.max_drawdown()?,
        })
    }

    pub fn what_if(&self, trades: &[(String, i64)]) -> Result<Vec<MarginalImpact>> {
        trades
            .iter()
            .map(|(identifier, share_delta)| {
                Ok(MarginalImpact {
                    identifier: identifier.clone(),
                    share_delta: *share_delta,
                    marginal_volatility: self.marginal_volatility(identifier, *share_delta)?,
                })
            })
            .collect()
    }
}

fn basket_columns<'a>(table: &'a PriceTable, basket: &Basket) -> Result<Vec<&'a [f64]>> {
    basket
        .iter()
        .map(|h| {
            table
                .column(&h.identifier)
                .ok_or_else(|| AnalyzerError::unavailable(&h.identifier, "missing from aligned prices"))
        })
        .collect()
}

// Shared by construction and what-if so both volatilities use one formula.
fn aggregate(quantities: &[f64], columns: &[&[f64]]) -> (Vec<f64>, Result<Vec<f64>>) {
    let prices = stats::weighted_sum(quantities, columns);
    let returns = stats::pct_change(&prices);
    (prices, returns)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub start: String,
    pub end: String,
    pub benchmark: String,
    pub holdings: usize,
    pub observations: usize,
    pub average_daily_return: f64,
    pub volatility: f64,
    pub risk_ratio: f64,
    pub max_drawdown: f64,
}

impl RiskSummary {
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        df!(
            "metric" => ["average_daily_return", "volatility", "risk_ratio", "max_drawdown"],
            "value" => [self.average_daily_return, self.volatility, self.risk_ratio, self.max_drawdown]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalImpact {
    pub identifier: String,
    pub share_delta: i64,
    pub marginal_volatility: f64,
}

pub fn impacts_to_frame(impacts: &[MarginalImpact]) -> PolarsResult<DataFrame> {
    let identifiers: Vec<_> = impacts.iter().map(|i| i.identifier.clone()).collect();
    let deltas: Vec<_> = impacts.iter().map(|i| i.share_delta).collect();
    let marginal: Vec<_> = impacts.iter().map(|i| i.marginal_volatility).collect();
    df!(
        "ticker" => identifiers,
        "shares" => deltas,
        "marginal_volatility" => marginal
    )
}

#[derive(Debug, Default)]
pub struct PortfolioBuilder {
    basket: Basket,
    start: Option<Date>,
    end: Option<Date>,
    benchmark: Option<String>,
}

impl PortfolioBuilder {
    pub fn new() -> PortfolioBuilder {
        PortfolioBuilder::default()
    }

    pub fn holding(mut self, identifier: &str, quantity: i64) -> Self {
        self.basket.insert(identifier, quantity);
        self
    }

    pub fn basket(mut self, basket: Basket) -> Self {
        for h in basket.iter() {
            self.basket.insert(&h.identifier, h.quantity);
        }
        self
    }

    pub fn start(mut self, start: Date) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: Date) -> Self {
        self.end = Some(end);
        self
    }

    pub fn benchmark(mut self, benchmark: &str) -> Self {
        self.benchmark = Some(benchmark.to_string());
        self
    }

    pub fn build<P: PriceProvider>(self, provider: P) -> Result<Portfolio<P>> {
        let start = self.start.ok_or_else(|| missing("start"))?;
        let end = self.end.ok_or_else(|| missing("end"))?;
        let benchmark = self.benchmark.ok_or_else(|| missing("benchmark"))?;
        let range = DateRange::new(start, end)?;
        Portfolio::new(self.basket, range, &benchmark, provider)
    }
}

fn missing(field: &str) -> AnalyzerError {
    AnalyzerError::MissingField {
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::types::PriceSeries;
    use approx::assert_relative_eq;
    use time::macros::date;

    const START: Date = date!(2022 - 01 - 03);

    fn series(id: &str, prices: &[f64]) -> PriceSeries {
        PriceSeries::from_pairs(
            id,
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| (START + time::Duration::days(i as i64), *p)),
        )
    }

    fn provider() -> StaticProvider {
        StaticProvider::new()
            .with_series(series("A", &[10.0, 11.0, 9.0, 12.0]))
            .with_series(series("B", &[20.0, 19.0, 21.0, 20.0]))
            .with_series(series("C", &[5.0, 6.0, 5.5, 5.0]))
            .with_series(series("SPY", &[100.0, 101.0, 99.0, 102.0]))
            .with_series(series("FLAT", &[50.0, 50.0, 50.0, 50.0]))
            .with_series(series("SHORT", &[5.0, 6.0]))
    }

    fn build<P: PriceProvider>(provider: P, benchmark: &str) -> Result<Portfolio<P>> {
        Portfolio::builder()
            .holding("A", 2)
            .holding("B", 1)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark(benchmark)
            .build(provider)
    }

    #[test]
    fn test_aggregate_scenario() {
        let portfolio = build(provider(), "SPY").unwrap();

        assert_eq!(portfolio.portfolio_prices(), &[40.0, 41.0, 39.0, 44.0]);
        assert_eq!(portfolio.dates().len(), 4);
        assert_eq!(portfolio.dates()[0], START);
        let returns = portfolio.portfolio_returns().unwrap();
        assert_eq!(returns.len(), portfolio.portfolio_prices().len() - 1);
        assert_relative_eq!(returns[0], 0.025, epsilon = 1e-12);
        assert_relative_eq!(returns[1], -0.0488, epsilon = 1e-4);
        assert_relative_eq!(returns[2], 0.1282, epsilon = 1e-4);
        assert_relative_eq!(portfolio.average_daily_return().unwrap(), 0.0348, epsilon = 1e-4);
        assert_relative_eq!(portfolio.max_drawdown().unwrap(), 39.0 / 41.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_construction_makes_two_requests() {
        let provider = provider();
        build(&provider, "SPY").unwrap();
        assert_eq!(provider.requests(), 2);
    }

    #[test]
    fn test_volatility_is_population_std() {
        let portfolio = build(provider(), "SPY").unwrap();
        let returns = portfolio.portfolio_returns().unwrap();
        let mean = returns.iter().sum::<f64>() / 3.0;
        let expected = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0).sqrt();

        let volatility = portfolio.volatility().unwrap();
        assert!(volatility >= 0.0);
        assert_relative_eq!(volatility, expected, epsilon = 1e-15);
    }

    #[test]
    fn test_risk_ratio() {
        let portfolio = build(provider(), "SPY").unwrap();
        let benchmark = stats::population_std(portfolio.benchmark_returns().unwrap()).unwrap();
        assert_relative_eq!(
            portfolio.risk_ratio().unwrap(),
            portfolio.volatility().unwrap() / benchmark,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_risk_ratio_constant_benchmark() {
        let portfolio = build(provider(), "FLAT").unwrap();
        assert!(matches!(
            portfolio.risk_ratio(),
            Err(AnalyzerError::DivisionUndefined { .. })
        ));
    }

    #[test]
    fn test_inverted_range() {
        let err = Portfolio::builder()
            .holding("A", 2)
            .start(date!(2022 - 06 - 01))
            .end(date!(2022 - 01 - 01))
            .benchmark("SPY")
            .build(provider())
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidRange { .. }));
    }

    #[test]
    fn test_builder_requires_every_input() {
        let err = Portfolio::builder()
            .holding("A", 2)
            .start(START)
            .end(START)
            .build(provider())
            .unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::MissingField {
                field: "benchmark".to_string()
            }
        );

        let err = Portfolio::builder()
            .start(START)
            .end(START)
            .benchmark("SPY")
            .build(provider())
            .unwrap_err();
        assert_eq!(err, AnalyzerError::EmptyBasket);
    }

    #[test]
    fn test_unknown_holding_aborts_construction() {
        let err = Portfolio::builder()
            .holding("NOPE", 1)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark("SPY")
            .build(provider())
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::DataUnavailable { .. }));

        let err = build(provider(), "NOPE").unwrap_err();
        assert!(matches!(err, AnalyzerError::DataUnavailable { .. }));
    }

    #[test]
    fn test_marginal_volatility_zero_delta() {
        let portfolio = build(provider(), "SPY").unwrap();
        assert_eq!(portfolio.marginal_volatility("A", 0).unwrap(), 0.0);
        assert_eq!(portfolio.marginal_volatility("C", 0).unwrap(), 0.0);
    }

    #[test]
    fn test_marginal_volatility_held() {
        let provider = provider();
        let portfolio = build(&provider, "SPY").unwrap();
        let before = portfolio.volatility().unwrap();

        // A: 3, B: 1 -> [50, 52, 48, 56]
        let hypothetical = stats::population_std(&stats::pct_change(&[50.0, 52.0, 48.0, 56.0]).unwrap()).unwrap();
        let marginal = portfolio.marginal_volatility("A", 1).unwrap();

        assert_relative_eq!(marginal, before - hypothetical, epsilon = 1e-12);
        assert_eq!(portfolio.volatility().unwrap(), before);
        assert_eq!(portfolio.basket().quantity("A"), Some(2));
        assert_eq!(provider.requests(), 2);
    }

    #[test]
    fn test_marginal_volatility_sign() {
        let portfolio = build(provider(), "SPY").unwrap();
        // B offsets A's swings; dropping it must raise volatility
        assert!(portfolio.marginal_volatility("B", -1).unwrap() < 0.0);
    }

    #[test]
    fn test_marginal_volatility_unheld() {
        let provider = provider();
        let portfolio = build(&provider, "SPY").unwrap();
        let before = portfolio.volatility().unwrap();

        // A: 2, B: 1, C: 4 -> [60, 65, 61, 64]
        let hypothetical = stats::population_std(&stats::pct_change(&[60.0, 65.0, 61.0, 64.0]).unwrap()).unwrap();
        let marginal = portfolio.marginal_volatility("C", 4).unwrap();

        assert_relative_eq!(marginal, before - hypothetical, epsilon = 1e-12);
        assert!(!portfolio.basket().contains("C"));
        assert_eq!(portfolio.volatility().unwrap(), before);
        assert_eq!(provider.requests(), 3);
    }

    #[test]
    fn test_marginal_volatility_unheld_failures() {
        let portfolio = build(provider(), "SPY").unwrap();
        assert!(matches!(
            portfolio.marginal_volatility("NOPE", 3),
            Err(AnalyzerError::DataUnavailable { .. })
        ));
        // SHORT lacks prices on the last two aligned dates
        assert!(matches!(
            portfolio.marginal_volatility("SHORT", 3),
            Err(AnalyzerError::DataUnavailable { .. })
        ));
        assert!(portfolio.volatility().is_ok());
    }

    #[test]
    fn test_insufficient_history() {
        let portfolio = Portfolio::builder()
            .holding("A", 2)
            .start(START)
            .end(START)
            .benchmark("SPY")
            .build(provider())
            .unwrap();

        assert!(portfolio.portfolio_returns().unwrap().is_empty());
        for result in [
            portfolio.average_daily_return(),
            portfolio.volatility(),
            portfolio.risk_ratio(),
            portfolio.max_drawdown(),
            portfolio.marginal_volatility("A", 1),
        ] {
            assert!(matches!(
                result,
                Err(AnalyzerError::InsufficientHistory { observations: 1 })
            ));
        }
    }

    #[test]
    fn test_zero_value_fails_only_dividing_statistics() {
        let provider = StaticProvider::new()
            .with_series(series("X", &[20.0, 10.0, 15.0]))
            .with_series(series("Y", &[10.0, 10.0, 10.0]))
            .with_series(series("SPY", &[1.0, 2.0, 1.5]));
        // X - Y -> [10, 0, 5]
        let portfolio = Portfolio::builder()
            .holding("X", 1)
            .holding("Y", -1)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark("SPY")
            .build(provider)
            .unwrap();

        assert_eq!(portfolio.portfolio_prices(), &[10.0, 0.0, 5.0]);
        assert_eq!(portfolio.max_drawdown().unwrap(), -1.0);
        for result in [
            portfolio.average_daily_return(),
            portfolio.volatility(),
            portfolio.risk_ratio(),
            portfolio.marginal_volatility("X", 1),
        ] {
            assert!(matches!(result, Err(AnalyzerError::DivisionUndefined { .. })));
        }
    }

    #[test]
    fn test_zero_quantity_basket_constructs() {
        let portfolio = Portfolio::builder()
            .holding("A", 0)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark("SPY")
            .build(provider())
            .unwrap();

        assert_eq!(portfolio.portfolio_prices(), &[0.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            portfolio.max_drawdown(),
            Err(AnalyzerError::DivisionUndefined { .. })
        ));
        assert!(matches!(
            portfolio.volatility(),
            Err(AnalyzerError::DivisionUndefined { .. })
        ));
    }

    #[test]
    fn test_zero_benchmark_price_only_blocks_risk_ratio() {
        let provider = provider().with_series(series("ZERO", &[0.0, 1.0, 2.0, 3.0]));
        let portfolio = build(provider, "ZERO").unwrap();

        assert!(portfolio.volatility().is_ok());
        assert!(portfolio.max_drawdown().is_ok());
        assert!(matches!(
            portfolio.benchmark_returns(),
            Err(AnalyzerError::DivisionUndefined { .. })
        ));
        assert!(matches!(
            portfolio.risk_ratio(),
            Err(AnalyzerError::DivisionUndefined { .. })
        ));
    }

    #[test]
    fn test_max_drawdown_rising_prices() {
        let provider = StaticProvider::new()
            .with_series(series("UP", &[1.0, 1.0, 2.0, 3.0]))
            .with_series(series("SPY", &[1.0, 2.0, 1.0, 2.0]));
        let portfolio = Portfolio::builder()
            .holding("UP", 10)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark("SPY")
            .build(provider)
            .unwrap();
        assert_eq!(portfolio.max_drawdown().unwrap(), 0.0);
    }

    #[test]
    fn test_constant_returns_have_zero_volatility() {
        let provider = StaticProvider::new()
            .with_series(series("G", &[1.0, 2.0, 4.0, 8.0]))
            .with_series(series("SPY", &[1.0, 2.0, 1.0, 2.0]));
        let portfolio = Portfolio::builder()
            .holding("G", 3)
            .start(START)
            .end(date!(2022 - 01 - 31))
            .benchmark("SPY")
            .build(provider)
            .unwrap();
        assert_eq!(portfolio.volatility().unwrap(), 0.0);
    }

    #[test]
    fn test_summary_and_what_if_frames() {
        let portfolio = build(provider(), "SPY").unwrap();
        let summary = portfolio.summary().unwrap();
        assert_eq!(summary.observations, 4);
        assert_eq!(summary.start, "2022-01-03");
        assert_eq!(summary.to_frame().unwrap().shape(), (4, 2));

        let impacts = portfolio
            .what_if(&[("A".to_string(), 0), ("C".to_string(), 4)])
            .unwrap();
        assert_eq!(impacts[0].marginal_volatility, 0.0);
        assert_eq!(impacts_to_frame(&impacts).unwrap().shape(), (2, 3));
    }
}
