use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use basket_risk::config::{parse_pair, AnalysisConfig, WhatIf};
use basket_risk::{impacts_to_frame, MarginalImpact, Portfolio, RiskSummary, YahooProvider};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Risk/return statistics and what-if volatility for a basket of equities.
#[derive(Parser, Debug)]
#[command(name = "basket-risk")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML analysis file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Holding as TICKER=SHARES (repeatable, replaces file entries)
    #[arg(long = "holding", value_parser = parse_pair)]
    holdings: Vec<(String, i64)>,

    /// First date of the range (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Last date of the range (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    /// Benchmark ticker
    #[arg(short, long)]
    benchmark: Option<String>,

    /// Hypothetical trade as TICKER=DELTA (repeatable)
    #[arg(long = "what-if", value_parser = parse_pair)]
    what_if: Vec<(String, i64)>,

    /// Per-request timeout for price downloads
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the aligned price table
    #[arg(long)]
    show_prices: bool,

    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    summary: &'a RiskSummary,
    what_if: &'a [MarginalImpact],
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    merge(&mut config, &args);
    let analysis = config.resolve()?;

    let mut provider = YahooProvider::new().context("starting price provider")?;
    if let Some(secs) = analysis.timeout_secs {
        provider = provider.with_timeout(Duration::from_secs(secs));
    }

    let start_time = std::time::Instant::now();
    let portfolio = Portfolio::new(analysis.basket, analysis.range, &analysis.benchmark, provider)?;
    tracing::debug!(elapsed = ?start_time.elapsed(), "constructed portfolio");

    let summary = portfolio.summary()?;
    let impacts = portfolio.what_if(&analysis.what_if)?;

    match args.format {
        OutputFormat::Table => {
            println!("Range: {} (benchmark {})", portfolio.range(), portfolio.benchmark());
            println!("Holdings: {}, trading days: {}", summary.holdings, summary.observations);
            if args.show_prices {
                println!("{}", portfolio.prices().to_frame()?);
            }
            println!("{}", summary.to_frame()?);
            if !impacts.is_empty() {
                println!("{}", impacts_to_frame(&impacts)?);
            }
        }
        OutputFormat::Json => {
            let report = Report {
                summary: &summary,
                what_if: &impacts,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn merge(config: &mut AnalysisConfig, args: &Args) {
    if let Some(start) = &args.start {
        config.start = Some(start.clone());
    }
    if let Some(end) = &args.end {
        config.end = Some(end.clone());
    }
    if let Some(benchmark) = &args.benchmark {
        config.benchmark = Some(benchmark.clone());
    }
    if args.timeout_secs.is_some() {
        config.provider.timeout_secs = args.timeout_secs;
    }
    for (ticker, shares) in &args.holdings {
        config.basket.insert(ticker, *shares);
    }
    config.what_if.extend(args.what_if.iter().map(|(identifier, shares)| WhatIf {
        identifier: identifier.clone(),
        shares: *shares,
    }));
}
