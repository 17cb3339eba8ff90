//! Risk and return statistics for a basket of equity positions.
//!
//! A [`Portfolio`] pulls aligned adjusted-close prices from a
//! [`PriceProvider`], aggregates them into one share-weighted price series and
//! answers volatility, drawdown, risk-ratio and what-if questions about it.
//!
//! ```rust,no_run
//! use basket_risk::{Portfolio, YahooProvider};
//! use time::macros::date;
//!
//! let portfolio = Portfolio::builder()
//!     .holding("AAPL", 50)
//!     .holding("AMZN", 1)
//!     .start(date!(2016 - 01 - 01))
//!     .end(date!(2017 - 12 - 31))
//!     .benchmark("^GSPC")
//!     .build(YahooProvider::new()?)?;
//!
//! println!("volatility: {}", portfolio.volatility()?);
//! println!("AMZN +3: {}", portfolio.marginal_volatility("AMZN", 3)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod portfolio;
pub mod provider;
pub mod stats;
pub mod table;
pub mod types;

pub use error::{AnalyzerError, Result};
pub use portfolio::{impacts_to_frame, MarginalImpact, Portfolio, PortfolioBuilder, RiskSummary};
pub use provider::{PriceProvider, StaticProvider, YahooProvider};
pub use table::PriceTable;
pub use types::{Basket, DateRange, Holding, PricePoint, PriceSeries};
