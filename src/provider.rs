use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{stream::FuturesUnordered, StreamExt};
use time::OffsetDateTime;
use yahoo_finance_api::{Quote, YahooConnector};

use crate::error::{AnalyzerError, Result};
use crate::table::PriceTable;
use crate::types::{DateRange, PricePoint, PriceSeries};

/// Source of historical adjusted-close prices.
///
/// `fetch` returns one table whose dates are the intersection of every
/// requested identifier's trading dates. Failing to retrieve any identifier
/// fails the whole call with [`AnalyzerError::DataUnavailable`].
pub trait PriceProvider {
    fn fetch(&self, identifiers: &[String], range: &DateRange) -> Result<PriceTable>;
    fn fetch_single(&self, identifier: &str, range: &DateRange) -> Result<PriceSeries>;
}

impl<P: PriceProvider + ?Sized> PriceProvider for &P {
    fn fetch(&self, identifiers: &[String], range: &DateRange) -> Result<PriceTable> {
        (**self).fetch(identifiers, range)
    }

    fn fetch_single(&self, identifier: &str, range: &DateRange) -> Result<PriceSeries> {
        (**self).fetch_single(identifier, range)
    }
}

/// Blocking Yahoo Finance provider. Requests for several tickers run
/// concurrently on a private current-thread runtime.
pub struct YahooProvider {
    client: YahooConnector,
    runtime: tokio::runtime::Runtime,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for YahooProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "YahooProvider {{ timeout: {:?} }}", self.timeout)
    }
}

impl YahooProvider {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client: YahooConnector::new(),
            runtime,
            timeout: None,
        })
    }

    /// Bounds every single request; a request exceeding it is reported as
    /// unavailable data.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn history(&self, ticker: &str, range: &DateRange) -> Result<PriceSeries> {
        let start = range.start().midnight().assume_utc();
        // end of range is inclusive
        let end = range
            .end()
            .next_day()
            .unwrap_or(range.end())
            .midnight()
            .assume_utc();

        let request = self.client.get_quote_history(ticker, start, end);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| AnalyzerError::unavailable(ticker, "request timed out"))?,
            None => request.await,
        }
        .map_err(|e| AnalyzerError::unavailable(ticker, e))?;

        let quotes = response
            .quotes()
            .map_err(|e| AnalyzerError::unavailable(ticker, e))?;
        let series = series_from_quotes(ticker, &quotes, range)?;
        tracing::debug!(ticker, quotes = series.len(), "fetched quote history");
        Ok(series)
    }
}

/// Adjusted closes keyed by the UTC calendar date of each quote, clipped to
/// `range` (both ends inclusive).
fn series_from_quotes(ticker: &str, quotes: &[Quote], range: &DateRange) -> Result<PriceSeries> {
    let points = quotes
        .iter()
        .map(|q| {
            let date = OffsetDateTime::from_unix_timestamp(q.timestamp as i64)
                .map_err(|e| AnalyzerError::unavailable(ticker, e))?
                .date();
            Ok(PricePoint {
                date,
                price: q.adjclose,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let series = PriceSeries::new(ticker, points).within(range);
    if series.is_empty() {
        return Err(AnalyzerError::unavailable(ticker, format!("no quotes in {range}")));
    }
    Ok(series)
}

impl PriceProvider for YahooProvider {
    fn fetch(&self, identifiers: &[String], range: &DateRange) -> Result<PriceTable> {
        let mut series = self.runtime.block_on(async {
            let mut futures: FuturesUnordered<_> = identifiers
                .iter()
                .map(|id| self.history(id, range))
                .collect();
            let mut series = Vec::with_capacity(identifiers.len());
            while let Some(result) = futures.next().await {
                series.push(result?);
            }
            Ok::<_, AnalyzerError>(series)
        })?;
        // completion order is arbitrary
        series.sort_by_key(|s| identifiers.iter().position(|id| *id == s.identifier));
        PriceTable::align(&series)
    }

    fn fetch_single(&self, identifier: &str, range: &DateRange) -> Result<PriceSeries> {
        self.runtime.block_on(self.history(identifier, range))
    }
}

/// In-memory provider over pre-loaded series. Counts the requests it serves.
#[derive(Debug, Default)]
pub struct StaticProvider {
    series: HashMap<String, PriceSeries>,
    requests: AtomicUsize,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.identifier.clone(), series);
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn lookup(&self, identifier: &str, range: &DateRange) -> Result<PriceSeries> {
        self.series
            .get(identifier)
            .map(|s| s.within(range))
            .ok_or_else(|| AnalyzerError::unavailable(identifier, "unknown identifier"))
    }
}

impl PriceProvider for StaticProvider {
    fn fetch(&self, identifiers: &[String], range: &DateRange) -> Result<PriceTable> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let series = identifiers
            .iter()
            .map(|id| self.lookup(id, range))
            .collect::<Result<Vec<_>>>()?;
        PriceTable::align(&series)
    }

    fn fetch_single(&self, identifier: &str, range: &DateRange) -> Result<PriceSeries> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.lookup(identifier, range)
    }
}
