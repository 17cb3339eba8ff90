use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use time::Date;

use crate::error::{AnalyzerError, Result};

/// A signed share count in one instrument. Negative quantities are shorts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub identifier: String,
    pub quantity: i64,
}

impl Holding {
    pub fn new(identifier: &str, quantity: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            quantity,
        }
    }
}

/// Holdings keyed by identifier, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Basket {
    holdings: Vec<Holding>,
}

impl Basket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a holding, replacing the quantity if the identifier is already present.
    pub fn insert(&mut self, identifier: &str, quantity: i64) {
        match self.position(identifier) {
            Some(idx) => self.holdings[idx].quantity = quantity,
            None => self.holdings.push(Holding::new(identifier, quantity)),
        }
    }

    pub fn with(mut self, identifier: &str, quantity: i64) -> Self {
        self.insert(identifier, quantity);
        self
    }

    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.holdings
            .iter()
            .position(|h| h.identifier == identifier)
    }

    pub fn quantity(&self, identifier: &str) -> Option<i64> {
        self.position(identifier).map(|idx| self.holdings[idx].quantity)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.position(identifier).is_some()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.identifier.clone()).collect()
    }

    pub fn quantities(&self) -> Vec<f64> {
        self.holdings.iter().map(|h| h.quantity as f64).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Holding> {
        self.holdings.iter()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, i64)> for Basket {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut basket = Basket::new();
        for (identifier, quantity) in iter {
            basket.insert(identifier.as_ref(), quantity);
        }
        basket
    }
}

// Reads a `ticker = shares` table and keeps the entries in document order.
impl<'de> Deserialize<'de> for Basket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BasketVisitor;

        impl<'de> Visitor<'de> for BasketVisitor {
            type Value = Basket;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of ticker = shares")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<Basket, M::Error> {
                let mut basket = Basket::new();
                while let Some((identifier, quantity)) = map.next_entry::<String, i64>()? {
                    basket.insert(&identifier, quantity);
                }
                Ok(basket)
            }
        }

        deserializer.deserialize_map(BasketVisitor)
    }
}

/// Inclusive calendar range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self> {
        if start > end {
            return Err(AnalyzerError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: Date,
    pub price: f64,
}

/// Adjusted-close history of one identifier, ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub identifier: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(identifier: &str, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self {
            identifier: identifier.to_string(),
            points,
        }
    }

    pub fn from_pairs(identifier: &str, pairs: impl IntoIterator<Item = (Date, f64)>) -> Self {
        let points = pairs
            .into_iter()
            .map(|(date, price)| PricePoint { date, price })
            .collect();
        Self::new(identifier, points)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Keeps only the points inside `range`.
    pub fn within(&self, range: &DateRange) -> Self {
        Self {
            identifier: self.identifier.clone(),
            points: self
                .points
                .iter()
                .filter(|p| range.contains(p.date))
                .copied()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
