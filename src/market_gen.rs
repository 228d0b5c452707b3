//! Synthetic market universe generator.
//!
//! Builds the sectors, companies and opening era deck of a run. Same config
//! (including seed) ⇒ same universe. Setup draws come from their own stream
//! derived from the seed, so the run's tick stream starts untouched.

use crate::era::{EraDeck, EraTemplate};
use crate::rng::{RandomSource, RandomStream};
use crate::types::{Company, CompanyId, Day, Sector};
use std::collections::BTreeSet;

/// Mixed into the run seed to derive the setup stream.
const SETUP_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

const NAME_HEADS: [&str; 12] = [
    "Apex", "Blue", "Cobalt", "Delta", "Ember", "Frontier", "Granite", "Harbor", "Iron", "Juniper", "Keystone", "Lumen",
];
const NAME_TAILS: [&str; 8] = ["Holdings", "Systems", "Works", "Group", "Partners", "Industries", "Labs", "Corp"];

/// Built-in sector table.
pub fn default_sectors() -> Vec<Sector> {
    vec![
        Sector::new("Technology", 1.2, 0.35).with_blurb("Chips, software and the cloud."),
        Sector::new("Energy", 1.0, 0.3).with_blurb("Oil, gas and the grid."),
        Sector::new("Finance", 1.1, 0.4).with_blurb("Banks, brokers and insurers."),
        Sector::new("Healthcare", 0.9, 0.2),
        Sector::new("Consumer", 1.0, 0.3),
        Sector::new("Industrials", 0.9, 0.35),
        Sector::new("Real Estate", 0.7, 0.25),
        Sector::new("Materials", 0.8, 0.3),
    ]
}

/// Configuration for the universe generator. All ranges are inclusive of the
/// lower bound and exclusive of the upper.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub sectors: Vec<Sector>,
    /// Companies listed beyond the one-per-sector baseline.
    pub filler_companies: usize,
    pub price_min: f64,
    pub price_max: f64,
    pub volatility_min: f64,
    pub volatility_max: f64,
    pub trend_min: f64,
    pub trend_max: f64,
    pub randomness_min: f64,
    pub randomness_max: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sectors: default_sectors(),
            filler_companies: 8,
            price_min: 5.0,
            price_max: 150.0,
            volatility_min: 0.015,
            volatility_max: 0.05,
            trend_min: -0.001,
            trend_max: 0.002,
            randomness_min: 0.005,
            randomness_max: 0.02,
        }
    }
}

/// Deterministic universe builder. A run keeps its generator so later
/// listings (IPOs) continue the id sequence and never reuse a symbol.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Generator {
    rng: RandomStream,
    config: GeneratorConfig,
    next_company_id: u64,
    symbols: BTreeSet<String>,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: RandomStream::new(config.seed ^ SETUP_SALT),
            config,
            next_company_id: 1,
            symbols: BTreeSet::new(),
        }
    }

    /// Claims the id and symbol of a company built elsewhere.
    pub fn register(&mut self, company: &Company) {
        self.next_company_id = self.next_company_id.max(company.id.0 + 1);
        self.symbols.insert(company.symbol.clone());
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.config.sectors
    }

    /// One company per sector, then the filler companies on weighted sectors.
    pub fn companies(&mut self) -> Vec<Company> {
        let sectors: Vec<String> = self.config.sectors.iter().map(|s| s.name.clone()).collect();
        let weights: Vec<f64> = self.config.sectors.iter().map(|s| s.weight).collect();
        let mut out: Vec<Company> = sectors.iter().map(|s| self.next_company(s, 0)).collect();
        for _ in 0..self.config.filler_companies {
            let Some(i) = self.rng.weighted_index(&weights) else {
                break;
            };
            let sector = sectors[i].clone();
            out.push(self.next_company(&sector, 0));
        }
        out
    }

    /// Lists one new company in `sector` on `day`.
    pub fn next_company(&mut self, sector: &str, day: Day) -> Company {
        let id = CompanyId(self.next_company_id);
        self.next_company_id += 1;
        let c = &self.config;
        let (p0, p1, v0, v1, t0, t1, r0, r1) = (
            c.price_min,
            c.price_max,
            c.volatility_min,
            c.volatility_max,
            c.trend_min,
            c.trend_max,
            c.randomness_min,
            c.randomness_max,
        );
        let name = self.name();
        let symbol = self.symbol(&name);
        let price = self.rng.uniform(p0, p1);
        let volatility = self.rng.uniform(v0, v1);
        let trend = self.rng.uniform(t0, t1);
        let randomness = self.rng.uniform(r0, r1);
        let mut company = Company::new(id, symbol, name, sector, price)
            .with_coefficients(volatility, trend, randomness)
            .with_listed_day(day);

        let sectors: Vec<(String, f64)> = self.config.sectors.iter().map(|s| (s.name.clone(), s.correlation)).collect();
        for (other, correlation) in sectors {
            if other == sector {
                company.event_affinity.insert(other, self.rng.uniform(0.5, 1.0));
                continue;
            }
            company.event_affinity.insert(other.clone(), self.rng.uniform(-1.0, 1.0));
            if self.rng.chance(correlation) {
                company.correlated_sectors.push(other);
            }
        }
        company
    }

    /// Opening era deck drawn from `templates`.
    pub fn era_deck(&mut self, templates: Vec<EraTemplate>, size: usize, duration_reduction: u32) -> EraDeck {
        EraDeck::generate(templates, size, duration_reduction, &mut self.rng)
    }

    fn name(&mut self) -> String {
        let head = self.rng.index(NAME_HEADS.len()).map(|i| NAME_HEADS[i]).unwrap_or("Apex");
        let tail = self.rng.index(NAME_TAILS.len()).map(|i| NAME_TAILS[i]).unwrap_or("Corp");
        format!("{} {}", head, tail)
    }

    /// Ticker from the name's initials, made unique with a numeric suffix.
    fn symbol(&mut self, name: &str) -> String {
        let base: String = name
            .split_whitespace()
            .flat_map(|w| w.chars().take(2))
            .map(|c| c.to_ascii_uppercase())
            .take(4)
            .collect();
        let mut symbol = base.clone();
        let mut n = 1;
        while self.symbols.contains(&symbol) {
            n += 1;
            symbol = format!("{}{}", base, n);
        }
        self.symbols.insert(symbol.clone());
        symbol
    }
}
