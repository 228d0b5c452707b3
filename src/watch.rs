//! Conditional watch orders evaluated against each day's intraday range.
//!
//! Orders are checked in placement order after prices publish. A touched order
//! fills at a price clamped inside the day's range and settles through the
//! [`Portfolio`]; filled, unfillable and expired orders leave the book.

use crate::error::{SimError, SimResult};
use crate::portfolio::{to_cents, Fill, Portfolio};
use crate::types::{Company, CompanyId, Day, IntradayRange, OrderId};
use log::{debug, info};
use rust_decimal::Decimal;

/// Fraction of the trigger a gapped stop-loss can slip to.
pub const STOP_LOSS_SLIPPAGE: f64 = 0.9;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WatchKind {
    LimitBuy { max_cash: Decimal },
    LimitSell { shares: u64 },
    StopLoss { shares: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeInForce {
    /// Eligible only on the day it was placed.
    Day,
    GoodTillRun,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatchOrder {
    pub id: OrderId,
    pub company: CompanyId,
    pub kind: WatchKind,
    pub trigger: f64,
    pub time_in_force: TimeInForce,
    pub created_day: Day,
}

/// Placement parameters.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatchRequest {
    pub company: CompanyId,
    pub kind: WatchKind,
    pub trigger: f64,
    pub time_in_force: TimeInForce,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchOutcome {
    Filled { order: WatchOrder, fill: Fill },
    /// Day order whose day passed without a fill.
    Expired { order: WatchOrder },
    /// Day order whose target was inactive or unpriced.
    Dropped { order: WatchOrder },
    /// Touched, but sized to zero shares.
    Unfillable { order: WatchOrder },
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Fill price for a touched order, before cent rounding.
pub fn fill_price(kind: &WatchKind, trigger: f64, range: &IntradayRange) -> f64 {
    let open = range.open;
    match kind {
        WatchKind::LimitBuy { .. } => clamp(open.min(trigger), open.min(range.low), open.max(trigger)),
        WatchKind::LimitSell { .. } => clamp(open.max(trigger), open.min(trigger), open.max(range.high)),
        WatchKind::StopLoss { .. } => {
            if open < trigger {
                range.low.max(trigger * STOP_LOSS_SLIPPAGE)
            } else {
                trigger.min(open)
            }
        }
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct WatchBook {
    orders: Vec<WatchOrder>,
    next_id: u64,
}

impl WatchBook {
    pub fn orders(&self) -> &[WatchOrder] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Adds an order if a slot is free and the request is valid.
    pub fn place(&mut self, req: WatchRequest, companies: &[Company], limit: usize, day: Day) -> SimResult<OrderId> {
        if self.orders.len() >= limit {
            return Err(SimError::WatchCapacity { limit });
        }
        if !req.trigger.is_finite() || req.trigger <= 0.0 {
            return Err(SimError::InvalidOrder(format!("trigger must be a positive price, got {}", req.trigger)));
        }
        match &req.kind {
            WatchKind::LimitBuy { max_cash } if *max_cash <= Decimal::ZERO => {
                return Err(SimError::InvalidOrder("max_cash must be positive".into()));
            }
            WatchKind::LimitSell { shares } | WatchKind::StopLoss { shares } if *shares == 0 => {
                return Err(SimError::InvalidOrder("shares must be positive".into()));
            }
            _ => {}
        }
        let company = companies
            .iter()
            .find(|c| c.id == req.company)
            .ok_or(SimError::UnknownCompany(req.company))?;
        if !company.is_active {
            return Err(SimError::InactiveCompany(req.company));
        }

        self.next_id += 1;
        let id = OrderId(self.next_id);
        info!(
            "watch placed id={} company={} kind={:?} trigger={} tif={:?} day={}",
            id.0, req.company, req.kind, req.trigger, req.time_in_force, day
        );
        self.orders.push(WatchOrder {
            id,
            company: req.company,
            kind: req.kind,
            trigger: req.trigger,
            time_in_force: req.time_in_force,
            created_day: day,
        });
        Ok(id)
    }

    /// Removes an order by id. Returns whether one was removed.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| o.id != id);
        let removed = self.orders.len() != before;
        if removed {
            info!("watch cancelled id={}", id.0);
        }
        removed
    }

    /// Checks every order against today's ranges, settling fills into `portfolio`.
    pub fn evaluate(&mut self, day: Day, companies: &[Company], portfolio: &mut Portfolio) -> Vec<WatchOutcome> {
        let mut outcomes = Vec::new();
        let mut kept = Vec::with_capacity(self.orders.len());
        for order in std::mem::take(&mut self.orders) {
            let one_shot = order.time_in_force == TimeInForce::Day;
            if one_shot && day > order.created_day {
                outcomes.push(WatchOutcome::Expired { order });
                continue;
            }
            let range = match companies.iter().find(|c| c.id == order.company) {
                Some(c) if c.is_active && c.today_range.generated => c.today_range,
                _ => {
                    if one_shot {
                        outcomes.push(WatchOutcome::Dropped { order });
                    } else {
                        kept.push(order);
                    }
                    continue;
                }
            };
            if !range.touches(order.trigger) {
                if one_shot {
                    outcomes.push(WatchOutcome::Expired { order });
                } else {
                    kept.push(order);
                }
                continue;
            }
            outcomes.push(settle(order, &range, day, portfolio));
        }
        self.orders = kept;
        outcomes
    }
}

fn settle(order: WatchOrder, range: &IntradayRange, day: Day, portfolio: &mut Portfolio) -> WatchOutcome {
    let price = match to_cents(fill_price(&order.kind, order.trigger, range)) {
        Some(p) if p > Decimal::ZERO => p,
        _ => return WatchOutcome::Unfillable { order },
    };
    let result = match &order.kind {
        WatchKind::LimitBuy { max_cash } => {
            let shares = portfolio.affordable_shares(*max_cash, price);
            if shares == 0 {
                None
            } else {
                Some(portfolio.buy(order.company, shares, price, day))
            }
        }
        WatchKind::LimitSell { shares } | WatchKind::StopLoss { shares } => {
            let shares = (*shares).min(portfolio.shares(order.company));
            if shares == 0 {
                None
            } else {
                Some(portfolio.sell(order.company, shares, price, day))
            }
        }
    };
    match result {
        Some(Ok(fill)) => {
            info!(
                "watch filled id={} company={} shares={} price={}",
                order.id.0, order.company, fill.shares, fill.price
            );
            WatchOutcome::Filled { order, fill }
        }
        Some(Err(e)) => {
            debug!("watch settle refused id={} err={}", order.id.0, e);
            WatchOutcome::Unfillable { order }
        }
        None => {
            debug!("watch unfillable id={} company={}", order.id.0, order.company);
            WatchOutcome::Unfillable { order }
        }
    }
}
