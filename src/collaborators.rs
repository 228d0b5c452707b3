//! Extension points the daily tick calls out to.
//!
//! Whale trading, company lifecycle (IPOs, bankruptcies, splits), bonds and
//! income live outside the core. They plug in through [`Collaborators`]; every
//! method defaults to a no-op. Hooks never see the random stream.

use crate::effects::MarketInfluence;
use crate::era::{Era, EraTransition};
use crate::portfolio::Portfolio;
use crate::types::{Company, Day};

pub trait Collaborators {
    /// Whale bonuses for the coming tick.
    fn pre_tick(&mut self, _day: Day, _era: &Era, _companies: &[Company]) -> MarketInfluence {
        MarketInfluence::default()
    }

    /// Runs after prices publish and watch orders settle.
    fn after_prices(&mut self, _day: Day, _companies: &mut Vec<Company>, _portfolio: &mut Portfolio) {}

    /// Era deck notices, one call per transition other than `Continued`.
    fn on_era_transition(&mut self, _transition: &EraTransition) {}
}

/// Core-only run.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCollaborators;

impl Collaborators for NoCollaborators {}
