//! Effect bundles fed into the tick from outside the core.
//!
//! - [`ArtifactEffects`]: folded from a list of [`EffectDelta`]s. The fold is a
//!   monoid: additive fields sum, multiplicative fields multiply, so the order
//!   of deltas never matters.
//! - [`DifficultyMode`]: preset bundle selected by [`Difficulty`].
//! - [`MarketInfluence`]: additive whale bonuses supplied before each tick.

use crate::types::CompanyId;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

/// One typed contribution from an artifact or legacy buff.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EffectDelta {
    /// Multiplies negative event impacts.
    NegativeEventMultiplier(f64),
    /// Added to the daily return of Energy-sector companies.
    EnergySectorBonus(f64),
    /// Multiplies every company's noise volatility.
    VolatilityMultiplier(f64),
    StartingCashBonus(Decimal),
    MarginBonus(f64),
    /// Extra standing watch-order slots.
    TriggerSlotBonus(u32),
    /// Days shaved off each era when a deck is drawn.
    EraDurationReduction(u32),
}

/// Aggregated artifact effects.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactEffects {
    pub negative_event_multiplier: f64,
    pub energy_sector_bonus: f64,
    pub volatility_multiplier: f64,
    pub starting_cash_bonus: Decimal,
    /// Consumed by margin collaborators; the core only carries it.
    pub margin_bonus: f64,
    pub trigger_slot_bonus: u32,
    pub era_duration_reduction: u32,
}

impl ArtifactEffects {
    /// Neutral element of [`ArtifactEffects::combine`].
    pub fn identity() -> Self {
        Self {
            negative_event_multiplier: 1.0,
            energy_sector_bonus: 0.0,
            volatility_multiplier: 1.0,
            starting_cash_bonus: Decimal::ZERO,
            margin_bonus: 0.0,
            trigger_slot_bonus: 0,
            era_duration_reduction: 0,
        }
    }

    /// Associative, commutative per field.
    pub fn combine(self, other: Self) -> Self {
        Self {
            negative_event_multiplier: self.negative_event_multiplier * other.negative_event_multiplier,
            energy_sector_bonus: self.energy_sector_bonus + other.energy_sector_bonus,
            volatility_multiplier: self.volatility_multiplier * other.volatility_multiplier,
            starting_cash_bonus: self.starting_cash_bonus + other.starting_cash_bonus,
            margin_bonus: self.margin_bonus + other.margin_bonus,
            trigger_slot_bonus: self.trigger_slot_bonus.saturating_add(other.trigger_slot_bonus),
            era_duration_reduction: self.era_duration_reduction.saturating_add(other.era_duration_reduction),
        }
    }

    pub fn fold<'a>(deltas: impl IntoIterator<Item = &'a EffectDelta>) -> Self {
        deltas
            .into_iter()
            .cloned()
            .map(Self::from)
            .fold(Self::identity(), Self::combine)
    }
}

impl Default for ArtifactEffects {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<EffectDelta> for ArtifactEffects {
    fn from(delta: EffectDelta) -> Self {
        let base = Self::identity();
        match delta {
            EffectDelta::NegativeEventMultiplier(m) => Self {
                negative_event_multiplier: m,
                ..base
            },
            EffectDelta::EnergySectorBonus(b) => Self {
                energy_sector_bonus: b,
                ..base
            },
            EffectDelta::VolatilityMultiplier(m) => Self {
                volatility_multiplier: m,
                ..base
            },
            EffectDelta::StartingCashBonus(c) => Self {
                starting_cash_bonus: c,
                ..base
            },
            EffectDelta::MarginBonus(m) => Self { margin_bonus: m, ..base },
            EffectDelta::TriggerSlotBonus(n) => Self {
                trigger_slot_bonus: n,
                ..base
            },
            EffectDelta::EraDurationReduction(n) => Self {
                era_duration_reduction: n,
                ..base
            },
        }
    }
}

/// Difficulty selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    /// No run-over: the era deck regenerates when exhausted.
    Endless,
}

impl Difficulty {
    pub fn mode(self) -> DifficultyMode {
        match self {
            Difficulty::Easy => DifficultyMode {
                starting_cash_multiplier: 1.5,
                volatility_multiplier: 0.8,
                event_multiplier: 0.8,
                no_run_over: false,
            },
            Difficulty::Normal => DifficultyMode::default(),
            Difficulty::Hard => DifficultyMode {
                starting_cash_multiplier: 0.75,
                volatility_multiplier: 1.25,
                event_multiplier: 1.3,
                no_run_over: false,
            },
            Difficulty::Endless => DifficultyMode {
                starting_cash_multiplier: 1.0,
                volatility_multiplier: 1.1,
                event_multiplier: 1.1,
                no_run_over: true,
            },
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "endless" => Ok(Difficulty::Endless),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// Difficulty bundle.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DifficultyMode {
    pub starting_cash_multiplier: f64,
    pub volatility_multiplier: f64,
    pub event_multiplier: f64,
    /// When set, an exhausted era deck regenerates instead of ending the run.
    pub no_run_over: bool,
}

impl Default for DifficultyMode {
    fn default() -> Self {
        Self {
            starting_cash_multiplier: 1.0,
            volatility_multiplier: 1.0,
            event_multiplier: 1.0,
            no_run_over: false,
        }
    }
}

/// Additive daily-return bonuses injected by whale activity.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketInfluence {
    pub sector_bonus: BTreeMap<String, f64>,
    pub company_bonus: BTreeMap<CompanyId, f64>,
}

impl MarketInfluence {
    pub fn with_sector(mut self, sector: impl Into<String>, bonus: f64) -> Self {
        *self.sector_bonus.entry(sector.into()).or_insert(0.0) += bonus;
        self
    }

    pub fn with_company(mut self, id: CompanyId, bonus: f64) -> Self {
        *self.company_bonus.entry(id).or_insert(0.0) += bonus;
        self
    }

    /// Sector plus company bonus for one company.
    pub fn bonus_for(&self, id: CompanyId, sector: &str) -> f64 {
        self.sector_bonus.get(sector).copied().unwrap_or(0.0) + self.company_bonus.get(&id).copied().unwrap_or(0.0)
    }
}
