//! Run configuration.
//!
//! Plain struct with defaults; [`SimConfig::from_env`] overrides the common
//! knobs from `MARKET_*` environment variables.

use crate::effects::{Difficulty, EffectDelta};
use crate::types::Day;
use log::warn;
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SimConfig {
    /// Seeds both the universe and the tick stream.
    pub seed: u64,
    pub difficulty: Difficulty,
    pub starting_cash: Decimal,
    /// Daily event probability before era and difficulty multipliers.
    pub base_event_chance: f64,
    /// Standing watch-order slots before artifact bonuses.
    pub base_watch_slots: usize,
    pub filler_companies: usize,
    pub era_deck_size: usize,
    /// Ends the run after this many completed days.
    pub max_days: Option<Day>,
    pub artifacts: Vec<EffectDelta>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            difficulty: Difficulty::Normal,
            starting_cash: Decimal::from(10_000),
            base_event_chance: 0.25,
            base_watch_slots: 3,
            filler_companies: 8,
            era_deck_size: 6,
            max_days: None,
            artifacts: Vec::new(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

impl SimConfig {
    /// Defaults overridden by `MARKET_SEED`, `MARKET_DIFFICULTY`,
    /// `MARKET_FILLER_COMPANIES` and `MARKET_MAX_DAYS`. Unparseable values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(seed) = env_parse("MARKET_SEED") {
            config.seed = seed;
        }
        if let Some(difficulty) = env_parse("MARKET_DIFFICULTY") {
            config.difficulty = difficulty;
        }
        if let Some(n) = env_parse("MARKET_FILLER_COMPANIES") {
            config.filler_companies = n;
        }
        if let Some(days) = env_parse("MARKET_MAX_DAYS") {
            config.max_days = Some(days);
        }
        config
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = SimConfig::default();
        assert_eq!(c.base_event_chance, 0.25);
        assert_eq!(c.base_watch_slots, 3);
        assert_eq!(c.difficulty, Difficulty::Normal);
        assert!(c.max_days.is_none());
    }

    #[test]
    fn config_round_trips_through_json() {
        let c = SimConfig::default()
            .with_seed(9)
            .with_difficulty(Difficulty::Endless);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"endless\""));
        let back: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed, 9);
        assert_eq!(back.difficulty, Difficulty::Endless);
    }
}
