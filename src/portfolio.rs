//! Player cash and holdings.
//!
//! Cash is a [`Decimal`] kept at cent precision; holdings are whole shares.
//! Immediate trades and watch-order fills both settle through [`Portfolio::buy`]
//! and [`Portfolio::sell`].

use crate::error::{SimError, SimResult};
use crate::types::{Company, CompanyId, Day};
use log::info;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// Converts a model price to a cent-rounded decimal.
pub fn to_cents(price: f64) -> Option<Decimal> {
    Decimal::from_f64(price).map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A settled trade.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Fill {
    pub company: CompanyId,
    pub side: Side,
    pub shares: u64,
    pub price: Decimal,
    pub day: Day,
}

impl Fill {
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.shares)
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradeCounters {
    pub buys: u64,
    pub sells: u64,
    pub shares_bought: u64,
    pub shares_sold: u64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Portfolio {
    cash: Decimal,
    holdings: BTreeMap<CompanyId, u64>,
    counters: TradeCounters,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash: cash.round_dp(2),
            holdings: BTreeMap::new(),
            counters: TradeCounters::default(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn shares(&self, company: CompanyId) -> u64 {
        self.holdings.get(&company).copied().unwrap_or(0)
    }

    pub fn holdings(&self) -> &BTreeMap<CompanyId, u64> {
        &self.holdings
    }

    pub fn counters(&self) -> &TradeCounters {
        &self.counters
    }

    /// Whole shares affordable at `price` with at most `budget` of the available cash.
    pub fn affordable_shares(&self, budget: Decimal, price: Decimal) -> u64 {
        if price <= Decimal::ZERO {
            return 0;
        }
        let spend = budget.min(self.cash);
        if spend <= Decimal::ZERO {
            return 0;
        }
        (spend / price).floor().to_u64().unwrap_or(0)
    }

    /// Adds (or with a negative amount, removes) cash. Used by income and bond collaborators.
    pub fn adjust_cash(&mut self, amount: Decimal) -> SimResult<()> {
        let next = (self.cash + amount).round_dp(2);
        if next < Decimal::ZERO {
            return Err(SimError::InsufficientCash);
        }
        self.cash = next;
        Ok(())
    }

    pub fn buy(&mut self, company: CompanyId, shares: u64, price: Decimal, day: Day) -> SimResult<Fill> {
        if shares == 0 {
            return Err(SimError::InvalidOrder("shares must be positive".into()));
        }
        if price <= Decimal::ZERO {
            return Err(SimError::InvalidOrder("price must be positive".into()));
        }
        let fill = Fill {
            company,
            side: Side::Buy,
            shares,
            price,
            day,
        };
        let cost = fill.notional().round_dp(2);
        if cost > self.cash {
            return Err(SimError::InsufficientCash);
        }
        self.cash -= cost;
        *self.holdings.entry(company).or_insert(0) += shares;
        self.counters.buys += 1;
        self.counters.shares_bought += shares;
        info!("buy company={} shares={} price={} cost={} cash={}", company, shares, price, cost, self.cash);
        Ok(fill)
    }

    pub fn sell(&mut self, company: CompanyId, shares: u64, price: Decimal, day: Day) -> SimResult<Fill> {
        if shares == 0 {
            return Err(SimError::InvalidOrder("shares must be positive".into()));
        }
        let held = self.shares(company);
        if held < shares {
            return Err(SimError::InsufficientShares);
        }
        if held == shares {
            self.holdings.remove(&company);
        } else {
            self.holdings.insert(company, held - shares);
        }
        let fill = Fill {
            company,
            side: Side::Sell,
            shares,
            price,
            day,
        };
        let proceeds = fill.notional();
        self.cash = (self.cash + proceeds).round_dp(2);
        self.counters.sells += 1;
        self.counters.shares_sold += shares;
        info!("sell company={} shares={} price={} proceeds={} cash={}", company, shares, price, proceeds, self.cash);
        Ok(fill)
    }

    /// Cash plus holdings marked at each company's current price.
    pub fn net_worth(&self, companies: &[Company]) -> Decimal {
        let marked: Decimal = self
            .holdings
            .iter()
            .filter_map(|(id, shares)| {
                let company = companies.iter().find(|c| c.id == *id)?;
                Some(to_cents(company.price)? * Decimal::from(*shares))
            })
            .sum();
        (self.cash + marked).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_then_sell_settles_cash_and_shares() {
        let mut p = Portfolio::new(Decimal::from(1_000));
        let price = to_cents(12.346).unwrap();
        assert_eq!(price, Decimal::new(1235, 2));
        let bought = p.buy(CompanyId(1), 10, price, 0).unwrap();
        assert_eq!(bought.notional(), Decimal::new(12350, 2));
        assert_eq!(p.shares(CompanyId(1)), 10);
        assert_eq!(p.cash(), Decimal::new(87650, 2));
        let sold = p.sell(CompanyId(1), 10, Decimal::from(13), 1).unwrap();
        assert_eq!(sold.notional(), Decimal::from(130));
        assert_eq!(p.shares(CompanyId(1)), 0);
        assert!(p.holdings().is_empty());
        assert_eq!(p.cash(), Decimal::new(100650, 2));
        assert_eq!(p.counters().buys, 1);
        assert_eq!(p.counters().shares_sold, 10);
    }

    #[test]
    fn refuses_overdraw_and_oversell() {
        let mut p = Portfolio::new(Decimal::from(100));
        assert!(matches!(
            p.buy(CompanyId(1), 11, Decimal::from(10), 0),
            Err(SimError::InsufficientCash)
        ));
        assert!(matches!(
            p.sell(CompanyId(1), 1, Decimal::from(10), 0),
            Err(SimError::InsufficientShares)
        ));
        assert!(matches!(
            p.buy(CompanyId(1), 0, Decimal::from(10), 0),
            Err(SimError::InvalidOrder(_))
        ));
        assert_eq!(p.cash(), Decimal::from(100));
    }

    #[test]
    fn affordable_shares_uses_smaller_of_budget_and_cash() {
        let p = Portfolio::new(Decimal::from(100));
        assert_eq!(p.affordable_shares(Decimal::from(55), Decimal::from(10)), 5);
        assert_eq!(p.affordable_shares(Decimal::from(500), Decimal::from(30)), 3);
        assert_eq!(p.affordable_shares(Decimal::from(5), Decimal::from(10)), 0);
        assert_eq!(p.affordable_shares(Decimal::from(5), Decimal::ZERO), 0);
    }

    #[test]
    fn net_worth_marks_holdings_to_market() {
        let mut p = Portfolio::new(Decimal::from(100));
        p.buy(CompanyId(7), 2, Decimal::from(10), 0).unwrap();
        let companies = vec![Company::new(CompanyId(7), "SEV", "Seven", "Finance", 15.0)];
        assert_eq!(p.net_worth(&companies), Decimal::from(110));
    }

    #[test]
    fn adjust_cash_never_goes_negative() {
        let mut p = Portfolio::new(Decimal::from(10));
        assert!(p.adjust_cash(Decimal::from(-11)).is_err());
        p.adjust_cash(Decimal::new(250, 2)).unwrap();
        assert_eq!(p.cash(), Decimal::new(1250, 2));
    }
}
