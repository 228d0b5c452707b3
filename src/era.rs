//! Macro eras and the era deck state machine.
//!
//! A run walks an ordered deck of [`Era`]s. Each tick [`EraDeck::advance`]
//! bumps the day counter and, when the current era has run its course, moves
//! to the next era, regenerates the deck (endless difficulty), or clamps on
//! the last era and reports the deck exhausted.
//!
//! Regeneration draws, per slot: rarity tier, template within the tier,
//! duration. Each regeneration bumps `era_deck_cycle`, which shifts weight from
//! common and uncommon tiers toward rare ones.

use crate::events::TagWeights;
use crate::rng::RandomSource;
use log::info;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraRarity {
    Common,
    Uncommon,
    Rare,
}

const TIERS: [EraRarity; 3] = [EraRarity::Common, EraRarity::Uncommon, EraRarity::Rare];

/// Tier weights `[common, uncommon, rare]` for a deck drawn at `cycle`. Sums to 1.
pub fn rarity_weights(cycle: u32) -> [f64; 3] {
    let shift = 0.02 * cycle as f64;
    let common = (0.7 - 0.75 * shift).max(0.2);
    let uncommon = (0.2 - 0.25 * shift).max(0.1);
    [common, uncommon, 1.0 - common - uncommon]
}

/// Multipliers and biases an era applies.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EraEffects {
    /// Global macro drift added to every daily return.
    pub trend_bias: f64,
    pub volatility_multiplier: f64,
    pub event_frequency_multiplier: f64,
    pub intraday_multiplier: f64,
    pub bond_yield_multiplier: f64,
    pub whale_activity_multiplier: f64,
    pub ipo_rate_multiplier: f64,
    pub bankruptcy_risk_multiplier: f64,
}

impl Default for EraEffects {
    fn default() -> Self {
        Self {
            trend_bias: 0.0,
            volatility_multiplier: 1.0,
            event_frequency_multiplier: 1.0,
            intraday_multiplier: 1.0,
            bond_yield_multiplier: 1.0,
            whale_activity_multiplier: 1.0,
            ipo_rate_multiplier: 1.0,
            bankruptcy_risk_multiplier: 1.0,
        }
    }
}

/// A timed macro regime.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Era {
    pub id: String,
    pub name: String,
    pub duration_days: u32,
    pub effects: EraEffects,
    /// Additive daily-return override per sector.
    #[serde(default)]
    pub sector_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub event_weights: TagWeights,
    pub rarity: EraRarity,
}

impl Era {
    /// Neutral era: no drift, unit multipliers.
    pub fn neutral(id: &str, duration_days: u32) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            duration_days: duration_days.max(1),
            effects: EraEffects::default(),
            sector_overrides: BTreeMap::new(),
            event_weights: TagWeights::default(),
            rarity: EraRarity::Common,
        }
    }

    pub fn sector_override(&self, sector: &str) -> f64 {
        self.sector_overrides.get(sector).copied().unwrap_or(0.0)
    }
}

/// Blueprint a deck draws eras from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EraTemplate {
    pub id: String,
    pub name: String,
    pub min_days: u32,
    pub max_days: u32,
    pub effects: EraEffects,
    #[serde(default)]
    pub sector_overrides: BTreeMap<String, f64>,
    #[serde(default)]
    pub event_weights: TagWeights,
    pub rarity: EraRarity,
}

impl EraTemplate {
    fn new(id: &str, name: &str, rarity: EraRarity, days: (u32, u32), effects: EraEffects) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            min_days: days.0,
            max_days: days.1.max(days.0),
            effects,
            sector_overrides: BTreeMap::new(),
            event_weights: TagWeights::default(),
            rarity,
        }
    }

    fn sector(mut self, sector: &str, bias: f64) -> Self {
        self.sector_overrides.insert(sector.to_string(), bias);
        self
    }

    fn tag(mut self, tag: &str, factor: f64) -> Self {
        self.event_weights.tags.insert(tag.to_string(), factor);
        self
    }

    pub fn instantiate(&self, duration_days: u32) -> Era {
        Era {
            id: self.id.clone(),
            name: self.name.clone(),
            duration_days: duration_days.max(1),
            effects: self.effects,
            sector_overrides: self.sector_overrides.clone(),
            event_weights: self.event_weights.clone(),
            rarity: self.rarity,
        }
    }
}

/// Draws a fresh deck of `size` eras, weighting tiers by [`rarity_weights`].
///
/// Three draws per slot. Durations lose `duration_reduction` days, floored at 1.
/// With no templates the deck is a single neutral era.
pub fn draw_deck<R: RandomSource>(
    templates: &[EraTemplate],
    size: usize,
    cycle: u32,
    duration_reduction: u32,
    rng: &mut R,
) -> Vec<Era> {
    if templates.is_empty() {
        return vec![Era::neutral("steady", 30)];
    }
    let weights = rarity_weights(cycle);
    (0..size.max(1))
        .map(|_| {
            let tier = rng.weighted_index(&weights).map(|i| TIERS[i]).unwrap_or(EraRarity::Common);
            let in_tier: Vec<&EraTemplate> = templates.iter().filter(|t| t.rarity == tier).collect();
            let template = if in_tier.is_empty() {
                rng.index(templates.len()).map(|i| &templates[i])
            } else {
                rng.index(in_tier.len()).map(|i| in_tier[i])
            }
            .unwrap_or(&templates[0]);
            let span = (template.max_days - template.min_days) as usize + 1;
            let extra = rng.index(span).unwrap_or(0) as u32;
            let days = (template.min_days + extra).saturating_sub(duration_reduction).max(1);
            template.instantiate(days)
        })
        .collect()
}

/// Outcome of one [`EraDeck::advance`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EraTransition {
    Continued,
    EraChanged { from: String, to: String },
    DeckReset { cycle: u32, first: String },
    /// Last era of a finite deck ended; the era stays in place.
    DeckExhausted { era: String },
}

/// The run's ordered eras and cursor.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EraDeck {
    eras: Vec<Era>,
    current_era_index: usize,
    current_era_day: u32,
    era_deck_cycle: u32,
    deck_size: usize,
    templates: Vec<EraTemplate>,
}

impl EraDeck {
    /// Deck over `eras`; an empty list becomes one neutral era.
    pub fn new(eras: Vec<Era>, templates: Vec<EraTemplate>) -> Self {
        let eras = if eras.is_empty() { vec![Era::neutral("steady", 30)] } else { eras };
        Self {
            deck_size: eras.len(),
            eras,
            current_era_index: 0,
            current_era_day: 0,
            era_deck_cycle: 0,
            templates,
        }
    }

    /// Draws the opening deck (cycle 0).
    pub fn generate<R: RandomSource>(templates: Vec<EraTemplate>, size: usize, duration_reduction: u32, rng: &mut R) -> Self {
        let eras = draw_deck(&templates, size, 0, duration_reduction, rng);
        Self::new(eras, templates)
    }

    pub fn current(&self) -> &Era {
        let i = self.current_era_index.min(self.eras.len().saturating_sub(1));
        &self.eras[i]
    }

    pub fn eras(&self) -> &[Era] {
        &self.eras
    }

    pub fn current_era_index(&self) -> usize {
        self.current_era_index
    }

    pub fn current_era_day(&self) -> u32 {
        self.current_era_day
    }

    pub fn era_deck_cycle(&self) -> u32 {
        self.era_deck_cycle
    }

    /// Days left in the current era, counting today.
    pub fn days_remaining(&self) -> u32 {
        self.current().duration_days.saturating_sub(self.current_era_day)
    }

    pub fn is_last_era(&self) -> bool {
        self.current_era_index + 1 >= self.eras.len()
    }

    /// Advances one day. `endless` selects regeneration over clamping at the deck end.
    pub fn advance<R: RandomSource>(&mut self, endless: bool, duration_reduction: u32, rng: &mut R) -> EraTransition {
        self.current_era_day += 1;
        if self.current_era_day < self.current().duration_days {
            return EraTransition::Continued;
        }
        let from = self.current().name.clone();
        if !self.is_last_era() {
            self.current_era_index += 1;
            self.current_era_day = 0;
            let to = self.current().name.clone();
            info!("era changed from={} to={} index={}", from, to, self.current_era_index);
            return EraTransition::EraChanged { from, to };
        }
        if endless {
            self.era_deck_cycle += 1;
            self.eras = draw_deck(&self.templates, self.deck_size, self.era_deck_cycle, duration_reduction, rng);
            self.current_era_index = 0;
            self.current_era_day = 0;
            let first = self.current().name.clone();
            info!(
                "era deck regenerated cycle={} size={} first={}",
                self.era_deck_cycle,
                self.eras.len(),
                first
            );
            return EraTransition::DeckReset {
                cycle: self.era_deck_cycle,
                first,
            };
        }
        self.current_era_day = 0;
        info!("era deck exhausted era={}", from);
        EraTransition::DeckExhausted { era: from }
    }
}

/// Built-in era templates.
pub fn default_era_templates() -> Vec<EraTemplate> {
    use EraRarity::*;
    let base = EraEffects::default();
    vec![
        EraTemplate::new("steady_growth", "Steady Growth", Common, (20, 35), EraEffects { trend_bias: 0.0005, ..base }),
        EraTemplate::new(
            "sideways_chop",
            "Sideways Chop",
            Common,
            (15, 30),
            EraEffects {
                volatility_multiplier: 1.1,
                intraday_multiplier: 1.2,
                ..base
            },
        ),
        EraTemplate::new(
            "rate_tightening",
            "Rate Tightening",
            Common,
            (20, 30),
            EraEffects {
                trend_bias: -0.0005,
                volatility_multiplier: 1.05,
                event_frequency_multiplier: 1.1,
                bond_yield_multiplier: 1.3,
                ..base
            },
        )
        .tag("rates", 2.0)
        .sector("Finance", 0.001),
        EraTemplate::new(
            "tech_boom",
            "Tech Boom",
            Uncommon,
            (15, 25),
            EraEffects {
                trend_bias: 0.001,
                volatility_multiplier: 1.2,
                ipo_rate_multiplier: 1.5,
                ..base
            },
        )
        .sector("Technology", 0.003)
        .tag("tech", 2.5)
        .tag("boom", 1.5),
        EraTemplate::new(
            "energy_crunch",
            "Energy Crunch",
            Uncommon,
            (10, 20),
            EraEffects {
                trend_bias: -0.0005,
                volatility_multiplier: 1.3,
                event_frequency_multiplier: 1.2,
                ..base
            },
        )
        .sector("Energy", 0.004)
        .sector("Industrials", -0.002)
        .tag("energy", 3.0)
        .tag("commodity", 2.0),
        EraTemplate::new(
            "credit_crunch",
            "Credit Crunch",
            Uncommon,
            (10, 20),
            EraEffects {
                trend_bias: -0.0015,
                volatility_multiplier: 1.4,
                bankruptcy_risk_multiplier: 1.5,
                whale_activity_multiplier: 0.7,
                ..base
            },
        )
        .sector("Finance", -0.003)
        .tag("crash", 1.6),
        EraTemplate::new(
            "great_bubble",
            "The Great Bubble",
            Rare,
            (8, 15),
            EraEffects {
                trend_bias: 0.003,
                volatility_multiplier: 1.6,
                event_frequency_multiplier: 1.5,
                intraday_multiplier: 1.4,
                whale_activity_multiplier: 1.5,
                ..base
            },
        )
        .tag("mania", 5.0)
        .tag("boom", 2.0),
        EraTemplate::new(
            "depression",
            "The Long Depression",
            Rare,
            (10, 18),
            EraEffects {
                trend_bias: -0.003,
                volatility_multiplier: 1.8,
                event_frequency_multiplier: 1.4,
                ipo_rate_multiplier: 0.3,
                bankruptcy_risk_multiplier: 2.0,
                ..base
            },
        )
        .tag("crash", 2.5),
        EraTemplate::new(
            "golden_age",
            "Golden Age",
            Rare,
            (15, 25),
            EraEffects {
                trend_bias: 0.002,
                volatility_multiplier: 0.8,
                event_frequency_multiplier: 0.8,
                ipo_rate_multiplier: 1.8,
                ..base
            },
        )
        .tag("boom", 1.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RandomStream, ScriptedSource};

    #[test]
    fn rarity_weights_sum_to_one_and_shift_toward_rare() {
        let mut last_rare = 0.0;
        for cycle in 0..60 {
            let [c, u, r] = rarity_weights(cycle);
            assert!((c + u + r - 1.0).abs() < 1e-12);
            assert!(c >= 0.2 && u >= 0.1 && r >= 0.1);
            assert!(r >= last_rare);
            last_rare = r;
        }
        assert_eq!(rarity_weights(0), [0.7, 0.2, 1.0 - 0.7 - 0.2]);
    }

    #[test]
    fn finite_single_era_deck_clamps_and_resets_day() {
        let mut deck = EraDeck::new(vec![Era::neutral("only", 3)], default_era_templates());
        let mut rng = ScriptedSource::new(vec![]);
        assert_eq!(deck.advance(false, 0, &mut rng), EraTransition::Continued);
        assert_eq!(deck.advance(false, 0, &mut rng), EraTransition::Continued);
        assert_eq!(deck.current_era_day(), 2);
        let t = deck.advance(false, 0, &mut rng);
        assert_eq!(t, EraTransition::DeckExhausted { era: "only".into() });
        assert_eq!(deck.current_era_day(), 0);
        assert_eq!(deck.current_era_index(), 0);
        assert_eq!(deck.era_deck_cycle(), 0);
        assert_eq!(rng.consumed(), 0);
    }

    #[test]
    fn endless_deck_regenerates_after_last_era() {
        let mut deck = EraDeck::new(vec![Era::neutral("only", 2)], default_era_templates());
        let mut rng = RandomStream::new(11);
        assert_eq!(deck.advance(true, 0, &mut rng), EraTransition::Continued);
        match deck.advance(true, 0, &mut rng) {
            EraTransition::DeckReset { cycle, .. } => assert_eq!(cycle, 1),
            other => panic!("expected deck reset, got {:?}", other),
        }
        assert_eq!(deck.era_deck_cycle(), 1);
        assert_eq!(deck.current_era_index(), 0);
        assert_eq!(deck.current_era_day(), 0);
        assert_ne!(deck.current().id, "only");
        assert_eq!(deck.eras().len(), 1, "regenerated deck keeps the deck size");
        assert_eq!(rng.draws(), 3);
    }

    #[test]
    fn advances_through_deck_in_order() {
        let mut deck = EraDeck::new(vec![Era::neutral("a", 1), Era::neutral("b", 2)], vec![]);
        let mut rng = ScriptedSource::new(vec![]);
        assert_eq!(
            deck.advance(false, 0, &mut rng),
            EraTransition::EraChanged {
                from: "a".into(),
                to: "b".into()
            }
        );
        assert_eq!(deck.current_era_index(), 1);
        assert_eq!(deck.days_remaining(), 2);
        assert!(deck.is_last_era());
    }

    #[test]
    fn draw_deck_is_deterministic_and_respects_reduction_floor() {
        let templates = default_era_templates();
        let a = draw_deck(&templates, 5, 0, 0, &mut RandomStream::new(3));
        let b = draw_deck(&templates, 5, 0, 0, &mut RandomStream::new(3));
        assert_eq!(a, b);
        let squeezed = draw_deck(&templates, 5, 0, 1_000, &mut RandomStream::new(3));
        assert!(squeezed.iter().all(|e| e.duration_days == 1));
    }

    #[test]
    fn draw_deck_picks_tier_then_template_then_duration() {
        let templates = default_era_templates();
        // tier 0.95 -> rare; first rare template; duration index 0 -> min_days.
        let mut rng = ScriptedSource::new(vec![0.95, 0.0, 0.0]);
        let deck = draw_deck(&templates, 1, 0, 2, &mut rng);
        assert_eq!(deck[0].id, "great_bubble");
        assert_eq!(deck[0].duration_days, 8 - 2);
        assert_eq!(deck[0].rarity, EraRarity::Rare);
    }

    #[test]
    fn empty_inputs_fall_back_to_neutral_era() {
        let deck = EraDeck::new(vec![], vec![]);
        assert_eq!(deck.current().id, "steady");
        assert_eq!(draw_deck(&[], 3, 0, 0, &mut ScriptedSource::new(vec![])).len(), 1);
    }
}
