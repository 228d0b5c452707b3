//! Daily close and intraday range synthesis.
//!
//! Each active company consumes exactly six draws per tick, in company order:
//! two for gaussian noise, one for jitter, then swing factor, high pad and low
//! pad. Inactive companies consume nothing.

use crate::effects::MarketInfluence;
use crate::era::Era;
use crate::events::{LingeringEffect, MarketEvent};
use crate::rng::RandomSource;
use crate::types::{round2, Company, CompanyId, IntradayRange, PRICE_FLOOR, RANGE_LOW_FLOOR};
use log::warn;

/// Sector that receives the artifact energy bonus.
pub const ENERGY_SECTOR: &str = "Energy";

/// Shock weight when an event's sector matches the company's sector.
pub const SAME_SECTOR_SHOCK: f64 = 1.2;
/// Shock weight otherwise.
pub const CROSS_SECTOR_SHOCK: f64 = 0.7;

/// Everything outside the company that shapes today's move.
#[derive(Clone, Copy, Debug)]
pub struct PriceContext<'a> {
    pub era: &'a Era,
    /// Difficulty times artifact volatility multiplier.
    pub run_volatility_multiplier: f64,
    pub negative_event_multiplier: f64,
    pub energy_sector_bonus: f64,
    pub influence: &'a MarketInfluence,
    pub events: &'a [MarketEvent],
    pub lingering: &'a [LingeringEffect],
}

/// One company's priced day.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceMove {
    pub company: CompanyId,
    pub symbol: String,
    /// Daily return before rounding and flooring.
    pub pct: f64,
    pub range: IntradayRange,
}

impl PriceMove {
    pub fn change(&self) -> f64 {
        round2(self.range.close - self.range.open)
    }
}

impl<'a> PriceContext<'a> {
    /// Noise sigma for `company`, including event volatility multipliers.
    pub fn sigma(&self, company: &Company) -> f64 {
        let events = self
            .events
            .iter()
            .filter(|e| e.reaches(company))
            .filter_map(|e| e.active_effects())
            .map(|fx| fx.volatility_multiplier);
        let lingering = self
            .lingering
            .iter()
            .filter(|l| l.reaches(company))
            .map(|l| l.effects.volatility_multiplier);
        let event_mult: f64 = events.chain(lingering).product();
        company.volatility * self.run_volatility_multiplier * self.era.effects.volatility_multiplier * event_mult
    }

    /// Sum of trend deltas from today's events and lingering effects that reach `company`.
    pub fn event_trend(&self, company: &Company) -> f64 {
        let today: f64 = self
            .events
            .iter()
            .filter(|e| e.reaches(company))
            .filter_map(|e| e.active_effects())
            .map(|fx| fx.trend_delta)
            .sum();
        let carried: f64 = self
            .lingering
            .iter()
            .filter(|l| l.reaches(company))
            .map(|l| l.effects.trend_delta)
            .sum();
        today + carried
    }

    /// Impact of today's events on `company`.
    pub fn shock(&self, company: &Company) -> f64 {
        self.events
            .iter()
            .map(|e| {
                let sector_weight = if e.sector.as_deref() == Some(company.sector.as_str()) {
                    SAME_SECTOR_SHOCK
                } else {
                    CROSS_SECTOR_SHOCK
                };
                let negative = if e.impact < 0.0 { self.negative_event_multiplier } else { 1.0 };
                e.effective_impact() * sector_weight * company.affinity_for(e.sector.as_deref()) * negative
            })
            .sum()
    }

    /// Whale, era-sector and artifact bonuses for `company`.
    pub fn bonuses(&self, company: &Company) -> f64 {
        let energy = if company.sector == ENERGY_SECTOR {
            self.energy_sector_bonus
        } else {
            0.0
        };
        self.influence.bonus_for(company.id, &company.sector) + self.era.sector_override(&company.sector) + energy
    }
}

/// Prices one company without mutating it. Six draws.
pub fn price_company<R: RandomSource>(company: &Company, ctx: &PriceContext<'_>, rng: &mut R) -> PriceMove {
    let open = company.price;
    let intraday = ctx.era.effects.intraday_multiplier;
    let sigma = ctx.sigma(company);

    let noise = rng.gaussian() * sigma;
    let spread = company.randomness * intraday;
    let jitter = rng.uniform(-spread, spread);
    let swing_factor = 0.5 + 0.7 * rng.next_f64();
    let high_u = rng.next_f64();
    let low_u = rng.next_f64();

    let mut pct = company.trend_bias
        + ctx.event_trend(company)
        + noise
        + jitter
        + ctx.era.effects.trend_bias
        + ctx.shock(company)
        + ctx.bonuses(company);
    if !pct.is_finite() {
        warn!("non-finite daily return company={} symbol={}, treating as flat", company.id, company.symbol);
        pct = 0.0;
    }

    let close = round2(open * (1.0 + pct)).max(PRICE_FLOOR);
    let mut swing = (close - open).abs().max(sigma * open * 0.3) * swing_factor;
    if !swing.is_finite() {
        swing = 0.0;
    }
    let high_pad = high_u * swing * 0.5 * intraday;
    let low_pad = low_u * swing * 0.5 * intraday;
    let high = round2(open.max(close) + swing + high_pad).max(open).max(close);
    let low = round2(open.min(close) - swing - low_pad).max(RANGE_LOW_FLOOR).min(open).min(close);

    PriceMove {
        company: company.id,
        symbol: company.symbol.clone(),
        pct,
        range: IntradayRange {
            open,
            high,
            low,
            close,
            generated: true,
        },
    }
}

/// Prices every active company in order and publishes each close.
pub fn price_market<R: RandomSource>(companies: &mut [Company], ctx: &PriceContext<'_>, rng: &mut R) -> Vec<PriceMove> {
    let mut moves = Vec::with_capacity(companies.len());
    for company in companies.iter_mut().filter(|c| c.is_active) {
        let mv = price_company(company, ctx, rng);
        company.record_close(mv.range);
        moves.push(mv);
    }
    moves
}
