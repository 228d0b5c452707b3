//! Random market events.
//!
//! [`EventGenerator::draw`] fires zero or one [`MarketEvent`] per day from a
//! weighted [`EventTemplate`] catalog. Draw order (always the same for a given
//! outcome of the earlier draws):
//!
//! 1. fire roll (always consumed, even when the chance is zero);
//! 2. template choice;
//! 3. sector: one draw for sector/company templates, otherwise an attach roll
//!    plus one more draw when it attaches;
//! 4. target company for company templates;
//! 5. impact.

use crate::rng::RandomSource;
use crate::types::{Company, CompanyId, Day, Sector};
use log::debug;
use std::collections::BTreeMap;

/// Probability that a template without a sector scope still gets a sector attached.
pub const SECTOR_ATTACH_CHANCE: f64 = 0.4;

/// Symmetric jitter around a template's fixed base impact.
pub const IMPACT_JITTER: f64 = 0.01;

/// Rarity tier of a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Tier multiplier. Grows with the tier; how rare a template actually is
    /// comes from its own base weight.
    pub fn base_weight(self) -> f64 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Uncommon => 1.15,
            Rarity::Rare => 1.3,
            Rarity::Epic => 1.45,
            Rarity::Legendary => 1.6,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Global,
    Sector,
    Company,
    /// Suspends the day until the player accepts or declines.
    PlayerChoice,
}

impl EventScope {
    fn always_has_sector(self) -> bool {
        matches!(self, EventScope::Sector | EventScope::Company)
    }
}

/// How a template samples its impact.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactSpec {
    /// Uniform instant shock in `[min, max)`.
    Shock { min: f64, max: f64 },
    /// Fixed impact plus [`IMPACT_JITTER`].
    Base { impact: f64 },
}

impl ImpactSpec {
    fn sample<R: RandomSource>(&self, rng: &mut R) -> f64 {
        match *self {
            ImpactSpec::Shock { min, max } => rng.uniform(min, max),
            ImpactSpec::Base { impact } => impact + rng.uniform(-IMPACT_JITTER, IMPACT_JITTER),
        }
    }
}

/// Structured effects that can outlive the day an event fires.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventEffects {
    /// Added to the daily return of every targeted company.
    pub trend_delta: f64,
    /// Multiplies noise volatility of every targeted company.
    pub volatility_multiplier: f64,
    pub duration_days: u32,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventTemplate {
    pub id: String,
    pub description: String,
    pub rarity: Rarity,
    pub base_weight: f64,
    pub tags: Vec<String>,
    pub scope: EventScope,
    pub impact: ImpactSpec,
    #[serde(default)]
    pub effects: Option<EventEffects>,
    #[serde(default)]
    pub chain: Option<String>,
}

impl EventTemplate {
    pub fn new(id: &str, description: &str, rarity: Rarity, base_weight: f64, scope: EventScope, impact: ImpactSpec) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            rarity,
            base_weight,
            tags: Vec::new(),
            scope,
            impact,
            effects: None,
            chain: None,
        }
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_effects(mut self, trend_delta: f64, volatility_multiplier: f64, duration_days: u32) -> Self {
        self.effects = Some(EventEffects {
            trend_delta,
            volatility_multiplier,
            duration_days,
        });
        self
    }

    pub fn chained(mut self, chain: &str) -> Self {
        self.chain = Some(chain.to_string());
        self
    }
}

/// Per-tag weight factors an era applies to the catalog.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TagWeights {
    /// Applied to every template.
    pub default: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, f64>,
}

impl TagWeights {
    pub fn with_tag(mut self, tag: &str, factor: f64) -> Self {
        self.tags.insert(tag.to_string(), factor);
        self
    }

    pub fn factor(&self, template: &EventTemplate) -> f64 {
        template
            .tags
            .iter()
            .filter_map(|t| self.tags.get(t))
            .fold(self.default, |acc, f| acc * f)
    }
}

impl Default for TagWeights {
    fn default() -> Self {
        Self {
            default: 1.0,
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceState {
    NotApplicable,
    Pending,
    Accepted,
    Declined,
}

/// Whether an effect aimed at (`sector`, `company`) reaches `target`.
///
/// A company target wins over a sector; with neither, everyone is hit.
pub fn reaches(sector: Option<&str>, company: Option<CompanyId>, target: &Company) -> bool {
    match (company, sector) {
        (Some(id), _) => id == target.id,
        (None, Some(s)) => s == target.sector,
        (None, None) => true,
    }
}

/// One day's fired event.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarketEvent {
    pub template_id: String,
    pub description: String,
    /// Raw sampled impact (signed fraction).
    pub impact: f64,
    pub scope: EventScope,
    pub sector: Option<String>,
    pub company: Option<CompanyId>,
    pub chain: Option<String>,
    pub effects: Option<EventEffects>,
    pub choice: ChoiceState,
    pub day: Day,
}

impl MarketEvent {
    pub fn is_pending(&self) -> bool {
        self.choice == ChoiceState::Pending
    }

    pub fn is_declined(&self) -> bool {
        self.choice == ChoiceState::Declined
    }

    /// Impact used by the price engine; zero once declined.
    pub fn effective_impact(&self) -> f64 {
        if self.is_declined() {
            0.0
        } else {
            self.impact
        }
    }

    /// Structured effects, suppressed once declined.
    pub fn active_effects(&self) -> Option<&EventEffects> {
        if self.is_declined() {
            None
        } else {
            self.effects.as_ref()
        }
    }

    pub fn reaches(&self, company: &Company) -> bool {
        reaches(self.sector.as_deref(), self.company, company)
    }

    /// Settles a pending choice. Returns false if nothing was pending.
    pub fn resolve(&mut self, accept: bool) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.choice = if accept { ChoiceState::Accepted } else { ChoiceState::Declined };
        true
    }

    /// Remainder of the structured effects after the firing day, if any.
    pub fn lingering(&self) -> Option<LingeringEffect> {
        let effects = self.active_effects()?;
        if effects.duration_days <= 1 {
            return None;
        }
        Some(LingeringEffect {
            template_id: self.template_id.clone(),
            sector: self.sector.clone(),
            company: self.company,
            effects: *effects,
            remaining_days: effects.duration_days - 1,
        })
    }
}

/// Structured effects still running after their event's day.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LingeringEffect {
    pub template_id: String,
    pub sector: Option<String>,
    pub company: Option<CompanyId>,
    pub effects: EventEffects,
    pub remaining_days: u32,
}

impl LingeringEffect {
    pub fn reaches(&self, company: &Company) -> bool {
        reaches(self.sector.as_deref(), self.company, company)
    }
}

/// Weighted template catalog.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EventGenerator {
    templates: Vec<EventTemplate>,
}

impl EventGenerator {
    pub fn new(templates: Vec<EventTemplate>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[EventTemplate] {
        &self.templates
    }

    /// Effective selection weight of each template under `overrides`.
    pub fn weights(&self, overrides: &TagWeights) -> Vec<f64> {
        self.templates
            .iter()
            .map(|t| t.rarity.base_weight() * t.base_weight * overrides.factor(t))
            .collect()
    }

    /// Draws today's event, if one fires.
    pub fn draw<R: RandomSource>(
        &self,
        rng: &mut R,
        chance: f64,
        sectors: &[Sector],
        companies: &[Company],
        overrides: &TagWeights,
        day: Day,
    ) -> Option<MarketEvent> {
        let roll = rng.next_f64();
        if roll >= chance {
            return None;
        }
        let template = &self.templates[rng.weighted_index(&self.weights(overrides))?];

        let sector_weights: Vec<f64> = sectors.iter().map(|s| s.weight).collect();
        let attach = template.scope.always_has_sector() || rng.chance(SECTOR_ATTACH_CHANCE);
        let sector = if attach {
            rng.weighted_index(&sector_weights).map(|i| sectors[i].name.clone())
        } else {
            None
        };

        let company = if template.scope == EventScope::Company {
            let candidates: Vec<&Company> = companies
                .iter()
                .filter(|c| c.is_active && Some(c.sector.as_str()) == sector.as_deref())
                .collect();
            rng.index(candidates.len()).map(|i| candidates[i].id)
        } else {
            None
        };

        let impact = template.impact.sample(rng);
        let choice = if template.scope == EventScope::PlayerChoice {
            ChoiceState::Pending
        } else {
            ChoiceState::NotApplicable
        };
        debug!(
            "event fired day={} template={} scope={:?} sector={:?} company={:?} impact={:.4}",
            day,
            template.id,
            template.scope,
            sector,
            company.map(|c| c.0),
            impact
        );
        Some(MarketEvent {
            template_id: template.id.clone(),
            description: template.description.clone(),
            impact,
            scope: template.scope,
            sector,
            company,
            chain: template.chain.clone(),
            effects: template.effects,
            choice,
            day,
        })
    }
}

impl Default for EventGenerator {
    fn default() -> Self {
        Self::new(default_event_catalog())
    }
}

/// Built-in event catalog.
pub fn default_event_catalog() -> Vec<EventTemplate> {
    use ImpactSpec::*;
    use Rarity::*;
    vec![
        EventTemplate::new("earnings_beat", "Quarterly earnings crush expectations", Common, 1.0, EventScope::Company, Shock { min: 0.03, max: 0.09 })
            .tagged(&["earnings", "boom"])
            .with_effects(0.002, 1.0, 3),
        EventTemplate::new("earnings_miss", "Quarterly earnings disappoint", Common, 1.0, EventScope::Company, Shock { min: -0.09, max: -0.03 })
            .tagged(&["earnings", "crash"])
            .with_effects(-0.002, 1.0, 3),
        EventTemplate::new("sector_rally", "Money rotates into the sector", Common, 0.8, EventScope::Sector, Shock { min: 0.02, max: 0.06 })
            .tagged(&["boom"]),
        EventTemplate::new("sector_selloff", "Funds dump the sector", Common, 0.8, EventScope::Sector, Shock { min: -0.06, max: -0.02 })
            .tagged(&["crash"]),
        EventTemplate::new("rate_hike", "Central bank raises rates", Uncommon, 0.5, EventScope::Global, Base { impact: -0.02 })
            .tagged(&["rates", "crash"])
            .with_effects(-0.001, 1.1, 5),
        EventTemplate::new("rate_cut", "Central bank cuts rates", Uncommon, 0.5, EventScope::Global, Base { impact: 0.02 })
            .tagged(&["rates", "boom"])
            .with_effects(0.001, 0.95, 5),
        EventTemplate::new("regulatory_probe", "Regulators open a sector-wide probe", Uncommon, 0.4, EventScope::Sector, Shock { min: -0.08, max: -0.03 })
            .tagged(&["regulation", "scandal"])
            .with_effects(-0.001, 1.2, 4)
            .chained("regulation"),
        EventTemplate::new("merger_rumor", "Takeover rumors swirl", Uncommon, 0.4, EventScope::Company, Shock { min: 0.05, max: 0.15 })
            .tagged(&["merger", "boom"])
            .with_effects(0.0, 1.3, 2),
        EventTemplate::new("activist_offer", "An activist fund offers to back a push. Accept?", Uncommon, 0.3, EventScope::PlayerChoice, Base { impact: 0.04 })
            .tagged(&["merger"])
            .with_effects(0.001, 1.2, 3),
        EventTemplate::new("oil_shock", "Supply disruption sends commodities flying", Rare, 0.2, EventScope::Global, Base { impact: -0.05 })
            .tagged(&["energy", "commodity", "crash"])
            .with_effects(-0.002, 1.4, 6),
        EventTemplate::new("tech_breakthrough", "A breakthrough reshapes the sector", Rare, 0.2, EventScope::Sector, Shock { min: 0.06, max: 0.14 })
            .tagged(&["tech", "boom"])
            .with_effects(0.003, 1.2, 5),
        EventTemplate::new("accounting_scandal", "Auditors find a hole in the books", Rare, 0.15, EventScope::Company, Shock { min: -0.25, max: -0.12 })
            .tagged(&["scandal", "crash"])
            .with_effects(-0.004, 1.5, 5)
            .chained("scandal"),
        EventTemplate::new("insider_tip", "A stranger offers you a tip. Act on it?", Rare, 0.15, EventScope::PlayerChoice, Shock { min: -0.05, max: 0.08 })
            .tagged(&["scandal"]),
        EventTemplate::new("flash_crash", "Algorithms stampede for the exits", Epic, 0.06, EventScope::Global, Shock { min: -0.12, max: -0.06 })
            .tagged(&["crash"])
            .with_effects(0.0, 1.8, 2),
        EventTemplate::new("stimulus_package", "Government unveils a stimulus package", Epic, 0.06, EventScope::Global, Base { impact: 0.06 })
            .tagged(&["boom", "rates"])
            .with_effects(0.002, 1.1, 7),
        EventTemplate::new("market_mania", "Retail mania grips the market", Legendary, 0.02, EventScope::Global, Base { impact: 0.10 })
            .tagged(&["boom", "mania"])
            .with_effects(0.004, 1.6, 8),
        EventTemplate::new("black_swan", "A black swan lands on the exchange", Legendary, 0.02, EventScope::Global, Shock { min: -0.25, max: -0.15 })
            .tagged(&["crash"])
            .with_effects(-0.003, 2.0, 6),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RandomStream, ScriptedSource};

    fn sectors() -> Vec<Sector> {
        vec![Sector::new("Technology", 1.0, 0.3), Sector::new("Energy", 1.0, 0.2)]
    }

    fn companies() -> Vec<Company> {
        vec![
            Company::new(CompanyId(1), "TEC", "Tec", "Technology", 10.0),
            Company::new(CompanyId(2), "NRG", "Nrg", "Energy", 20.0),
            Company::new(CompanyId(3), "VLT", "Volt", "Energy", 30.0),
        ]
    }

    fn catalog() -> EventGenerator {
        EventGenerator::new(vec![
            EventTemplate::new("global", "g", Rarity::Common, 1.0, EventScope::Global, ImpactSpec::Base { impact: -0.02 }).tagged(&["crash"]),
            EventTemplate::new("sector", "s", Rarity::Common, 1.0, EventScope::Sector, ImpactSpec::Shock { min: 0.02, max: 0.06 }).tagged(&["boom"]),
            EventTemplate::new("company", "c", Rarity::Common, 1.0, EventScope::Company, ImpactSpec::Shock { min: -0.1, max: -0.05 })
                .tagged(&["crash"])
                .with_effects(-0.01, 1.5, 3),
            EventTemplate::new("choice", "p", Rarity::Common, 1.0, EventScope::PlayerChoice, ImpactSpec::Base { impact: 0.05 }).tagged(&["merger"]),
        ])
    }

    fn only(tag_keep: &str) -> TagWeights {
        let mut w = TagWeights {
            default: 1.0,
            tags: BTreeMap::new(),
        };
        for tag in ["crash", "boom", "merger"] {
            if tag != tag_keep {
                w.tags.insert(tag.to_string(), 0.0);
            }
        }
        w
    }

    #[test]
    fn no_event_when_roll_at_or_above_chance() {
        let mut rng = ScriptedSource::new(vec![0.5]);
        let ev = catalog().draw(&mut rng, 0.5, &sectors(), &companies(), &TagWeights::default(), 0);
        assert!(ev.is_none());
        assert_eq!(rng.consumed(), 1);
    }

    #[test]
    fn zero_chance_still_consumes_the_roll() {
        let mut rng = ScriptedSource::new(vec![0.0]);
        assert!(catalog().draw(&mut rng, 0.0, &sectors(), &companies(), &TagWeights::default(), 0).is_none());
        assert_eq!(rng.consumed(), 1);
    }

    #[test]
    fn weights_multiply_rarity_base_and_tag_overrides() {
        let gen = EventGenerator::new(vec![EventTemplate::new("x", "x", Rarity::Rare, 0.5, EventScope::Global, ImpactSpec::Base { impact: 0.0 })
            .tagged(&["crash", "rates"])]);
        let overrides = TagWeights {
            default: 2.0,
            tags: BTreeMap::new(),
        }
        .with_tag("crash", 3.0)
        .with_tag("rates", 0.5);
        let w = gen.weights(&overrides);
        assert!((w[0] - 1.3 * 0.5 * 2.0 * 3.0 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn rarity_multiplier_is_monotonic() {
        let tiers = [Rarity::Common, Rarity::Uncommon, Rarity::Rare, Rarity::Epic, Rarity::Legendary];
        for pair in tiers.windows(2) {
            assert!(pair[0].base_weight() < pair[1].base_weight());
        }
    }

    #[test]
    fn sector_scoped_event_always_attaches_sector() {
        // roll, template, sector, impact
        let mut rng = ScriptedSource::new(vec![0.0, 0.5, 0.9, 0.5]);
        let ev = catalog()
            .draw(&mut rng, 1.0, &sectors(), &companies(), &only("boom"), 4)
            .expect("event");
        assert_eq!(ev.template_id, "sector");
        assert_eq!(ev.sector.as_deref(), Some("Energy"));
        assert!((ev.impact - 0.04).abs() < 1e-12);
        assert_eq!(ev.day, 4);
        assert_eq!(rng.consumed(), 4);
    }

    #[test]
    fn global_event_attaches_sector_only_below_attach_chance() {
        // roll, template, attach roll (0.39 < 0.4), sector, impact
        let mut rng = ScriptedSource::new(vec![0.0, 0.0, 0.39, 0.1, 0.5]);
        let mut only_global = only("crash");
        only_global.tags.insert("crash".into(), 1.0);
        let gen = EventGenerator::new(vec![catalog().templates()[0].clone()]);
        let ev = gen.draw(&mut rng, 1.0, &sectors(), &companies(), &only_global, 0).expect("event");
        assert_eq!(ev.sector.as_deref(), Some("Technology"));
        assert_eq!(rng.consumed(), 5);

        // attach roll 0.4 fails: roll, template, attach roll, impact
        let mut rng = ScriptedSource::new(vec![0.0, 0.0, 0.4, 0.5]);
        let ev = gen.draw(&mut rng, 1.0, &sectors(), &companies(), &only_global, 0).expect("event");
        assert_eq!(ev.sector, None);
        assert!((ev.impact + 0.02).abs() < 1e-12);
        assert_eq!(rng.consumed(), 4);
    }

    #[test]
    fn company_event_targets_active_company_in_sector() {
        let mut comps = companies();
        comps[1].delist();
        let gen = EventGenerator::new(vec![catalog().templates()[2].clone()]);
        // roll, template, sector (Energy), company index, impact
        let mut rng = ScriptedSource::new(vec![0.0, 0.0, 0.75, 0.0, 0.0]);
        let ev = gen.draw(&mut rng, 1.0, &sectors(), &comps, &TagWeights::default(), 0).expect("event");
        assert_eq!(ev.company, Some(CompanyId(3)));
        assert!(ev.reaches(&comps[2]));
        assert!(!ev.reaches(&comps[1]));
        assert!((ev.impact + 0.1).abs() < 1e-12);
        let linger = ev.lingering().expect("three-day effect lingers");
        assert_eq!(linger.remaining_days, 2);
    }

    #[test]
    fn declined_choice_zeroes_impact_but_keeps_event() {
        let gen = EventGenerator::new(vec![catalog().templates()[3].clone()]);
        let mut rng = ScriptedSource::new(vec![0.0, 0.0, 0.9, 0.5]);
        let mut ev = gen.draw(&mut rng, 1.0, &sectors(), &companies(), &TagWeights::default(), 0).expect("event");
        assert!(ev.is_pending());
        assert!(ev.resolve(false));
        assert!(!ev.resolve(true), "already resolved");
        assert_eq!(ev.effective_impact(), 0.0);
        assert!((ev.impact - 0.05).abs() < 1e-12);
        assert!(ev.active_effects().is_none());
    }

    #[test]
    fn zeroed_catalog_fires_nothing() {
        let gen = catalog();
        let mut none = TagWeights::default();
        none.default = 0.0;
        let mut rng = RandomStream::new(5);
        for day in 0..50 {
            assert!(gen.draw(&mut rng, 1.0, &sectors(), &companies(), &none, day).is_none());
        }
    }

    #[test]
    fn default_catalog_has_unique_ids_and_sane_ranges() {
        let catalog = default_event_catalog();
        let mut ids: Vec<&str> = catalog.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
        for t in &catalog {
            if let ImpactSpec::Shock { min, max } = t.impact {
                assert!(min < max, "{} has inverted shock range", t.id);
            }
            assert!(t.base_weight > 0.0);
        }
    }
}
