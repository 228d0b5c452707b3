//! Core market types: identifiers, sectors, companies and intraday ranges.
//!
//! Identifiers are newtype wrappers. Prices are `f64` in the model and rounded
//! to cents whenever they are published.

use std::collections::BTreeMap;
use std::fmt;

/// Lowest close a company can print.
pub const PRICE_FLOOR: f64 = 0.10;

/// Lowest intraday low a synthesized range can print.
pub const RANGE_LOW_FLOOR: f64 = 0.05;

/// Company identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct CompanyId(pub u64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Watch order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

/// Simulated trading day, starting at 0.
pub type Day = u32;

/// Rounds to cents.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Static sector reference datum.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sector {
    pub name: String,
    /// Relative selection weight for sector-scoped events.
    pub weight: f64,
    /// Probability that a company of another sector counts this one as correlated.
    pub correlation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurb: Option<String>,
}

impl Sector {
    pub fn new(name: impl Into<String>, weight: f64, correlation: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            correlation,
            blurb: None,
        }
    }

    pub fn with_blurb(mut self, blurb: impl Into<String>) -> Self {
        self.blurb = Some(blurb.into());
        self
    }
}

/// Synthesized open/high/low/close for one company on one day.
///
/// Invariant: `low <= open <= high` and `low <= close <= high`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IntradayRange {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// False for the flat placeholder a company carries until its first tick.
    pub generated: bool,
}

impl IntradayRange {
    /// Ungenerated placeholder at a listing price.
    pub fn flat(price: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            generated: false,
        }
    }

    /// Whether `price` lies within `[low, high]`.
    pub fn touches(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    pub fn is_consistent(&self) -> bool {
        self.low <= self.open && self.open <= self.high && self.low <= self.close && self.close <= self.high
    }
}

/// A listed company.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub price: f64,
    /// Listing price followed by one close per completed tick.
    pub history: Vec<f64>,
    pub volatility: f64,
    pub trend_bias: f64,
    pub randomness: f64,
    /// Per-sector reaction coefficient to events, roughly in `[-1, 1]`.
    pub event_affinity: BTreeMap<String, f64>,
    pub correlated_sectors: Vec<String>,
    pub is_active: bool,
    pub split_count: u32,
    pub listed_day: Day,
    pub today_range: IntradayRange,
}

impl Company {
    /// Lists a company at `price` (floored at [`PRICE_FLOOR`]) with default coefficients.
    pub fn new(id: CompanyId, symbol: impl Into<String>, name: impl Into<String>, sector: impl Into<String>, price: f64) -> Self {
        let price = if price.is_finite() { round2(price).max(PRICE_FLOOR) } else { PRICE_FLOOR };
        Self {
            id,
            symbol: symbol.into(),
            name: name.into(),
            sector: sector.into(),
            price,
            history: vec![price],
            volatility: 0.03,
            trend_bias: 0.0,
            randomness: 0.01,
            event_affinity: BTreeMap::new(),
            correlated_sectors: Vec::new(),
            is_active: true,
            split_count: 0,
            listed_day: 0,
            today_range: IntradayRange::flat(price),
        }
    }

    pub fn with_coefficients(mut self, volatility: f64, trend_bias: f64, randomness: f64) -> Self {
        self.volatility = volatility;
        self.trend_bias = trend_bias;
        self.randomness = randomness;
        self
    }

    pub fn with_listed_day(mut self, day: Day) -> Self {
        self.listed_day = day;
        self
    }

    /// Affinity toward events attached to `sector`; sectorless events use 1.0.
    pub fn affinity_for(&self, sector: Option<&str>) -> f64 {
        match sector {
            Some(s) => self.event_affinity.get(s).copied().unwrap_or(1.0),
            None => 1.0,
        }
    }

    /// Publishes a new close and its range.
    pub fn record_close(&mut self, range: IntradayRange) {
        self.price = range.close;
        self.history.push(range.close);
        self.today_range = range;
    }

    /// Removes the company from trading; its history is kept.
    pub fn delist(&mut self) {
        self.is_active = false;
    }
}
