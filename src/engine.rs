//! Daily tick orchestrator.
//!
//! [`Market`] owns one run and is the single entry point: create with
//! [`Market::new`], then call [`Market::advance_day`] once per simulated day.
//!
//! A tick is a pipeline of owned stage values:
//!
//! ```text
//! pre_tick ─▶ DayPlan ─▶ PricedDay ─▶ SettledDay ─▶ after_prices ─▶ era ─▶ DayReport
//!                │
//!                └─ pending choice: parked until resolve_choice
//! ```
//!
//! Random draw order per tick: event stage, then six draws per active company
//! in company order, then the era stage (three draws per deck slot, only when
//! an endless deck regenerates). Collaborator hooks never touch the stream.

use crate::collaborators::{Collaborators, NoCollaborators};
use crate::config::SimConfig;
use crate::effects::{ArtifactEffects, DifficultyMode, EffectDelta, MarketInfluence};
use crate::era::{default_era_templates, Era, EraDeck, EraTransition};
use crate::error::{SimError, SimResult};
use crate::events::{EventGenerator, LingeringEffect, MarketEvent};
use crate::market_gen::{Generator, GeneratorConfig};
use crate::portfolio::{to_cents, Fill, Portfolio};
use crate::pricing::{price_market, PriceContext, PriceMove};
use crate::rng::RandomStream;
use crate::types::{Company, CompanyId, Day, OrderId, Sector};
use crate::watch::{WatchBook, WatchOrder, WatchOutcome, WatchRequest};
use log::{debug, info};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Influence and events for one day, before prices move.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DayPlan {
    pub day: Day,
    pub influence: MarketInfluence,
    pub events: Vec<MarketEvent>,
}

impl DayPlan {
    pub fn pending_event(&self) -> Option<&MarketEvent> {
        self.events.iter().find(|e| e.is_pending())
    }
}

#[derive(Clone, Debug)]
pub struct PricedDay {
    pub plan: DayPlan,
    pub moves: Vec<PriceMove>,
}

#[derive(Clone, Debug)]
pub struct SettledDay {
    pub priced: PricedDay,
    pub watch: Vec<WatchOutcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOverReason {
    DeckExhausted,
    MaxDays,
}

/// Everything that happened on one completed day.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DayReport {
    pub day: Day,
    pub era: String,
    pub events: Vec<MarketEvent>,
    pub moves: Vec<PriceMove>,
    pub watch: Vec<WatchOutcome>,
    /// Era notices, `Continued` omitted.
    pub era_notices: Vec<EraTransition>,
    pub run_over: Option<RunOverReason>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Tick parked on a player choice; nothing priced or filled yet.
    AwaitingChoice { day: Day, event: MarketEvent },
    Completed { report: DayReport },
}

/// Run counters.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunStats {
    pub days_completed: u32,
    pub events_fired: u32,
    pub choices_accepted: u32,
    pub choices_declined: u32,
    pub watch_filled: u32,
    pub watch_expired: u32,
    pub watch_dropped: u32,
    pub watch_unfillable: u32,
    pub era_transitions: u32,
    pub deck_resets: u32,
}

impl RunStats {
    fn record_watch(&mut self, outcomes: &[WatchOutcome]) {
        for o in outcomes {
            match o {
                WatchOutcome::Filled { .. } => self.watch_filled += 1,
                WatchOutcome::Expired { .. } => self.watch_expired += 1,
                WatchOutcome::Dropped { .. } => self.watch_dropped += 1,
                WatchOutcome::Unfillable { .. } => self.watch_unfillable += 1,
            }
        }
    }
}

/// Read-only view of a run for clients.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MarketSnapshot {
    pub day: Day,
    pub era: Era,
    pub era_day: u32,
    pub era_index: usize,
    pub era_deck_cycle: u32,
    pub cash: Decimal,
    pub net_worth: Decimal,
    pub holdings: Vec<(CompanyId, u64)>,
    pub companies: Vec<Company>,
    pub watch_orders: Vec<WatchOrder>,
    pub pending_event: Option<MarketEvent>,
    pub run_over: Option<RunOverReason>,
    pub stats: RunStats,
}

/// One run of the simulated market.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Market {
    config: SimConfig,
    day: Day,
    sectors: Vec<Sector>,
    companies: Vec<Company>,
    events: EventGenerator,
    deck: EraDeck,
    watch: WatchBook,
    portfolio: Portfolio,
    lingering: Vec<LingeringEffect>,
    artifacts: ArtifactEffects,
    rng: RandomStream,
    /// Setup stream and id/symbol ledger; later listings draw from it.
    generator: Generator,
    pending: Option<DayPlan>,
    stats: RunStats,
    run_over: Option<RunOverReason>,
}

impl Market {
    /// Generates the universe and opening era deck from `config.seed`.
    pub fn new(config: SimConfig) -> Self {
        let artifacts = ArtifactEffects::fold(&config.artifacts);
        let mut generator = Generator::new(GeneratorConfig {
            seed: config.seed,
            filler_companies: config.filler_companies,
            ..Default::default()
        });
        let sectors = generator.sectors().to_vec();
        let companies = generator.companies();
        let deck = generator.era_deck(default_era_templates(), config.era_deck_size, artifacts.era_duration_reduction);
        Self::assemble(config, sectors, companies, deck, generator)
    }

    /// Run over an explicit universe and deck.
    pub fn from_parts(config: SimConfig, sectors: Vec<Sector>, companies: Vec<Company>, deck: EraDeck) -> Self {
        let mut generator = Generator::new(GeneratorConfig {
            seed: config.seed,
            sectors: sectors.clone(),
            filler_companies: 0,
            ..Default::default()
        });
        for company in &companies {
            generator.register(company);
        }
        Self::assemble(config, sectors, companies, deck, generator)
    }

    fn assemble(config: SimConfig, sectors: Vec<Sector>, companies: Vec<Company>, deck: EraDeck, generator: Generator) -> Self {
        let artifacts = ArtifactEffects::fold(&config.artifacts);
        let mode = config.difficulty.mode();
        let multiplier = Decimal::from_f64(mode.starting_cash_multiplier).unwrap_or(Decimal::ONE);
        let cash = (config.starting_cash * multiplier + artifacts.starting_cash_bonus).max(Decimal::ZERO);
        info!(
            "run created seed={} difficulty={:?} companies={} eras={} cash={}",
            config.seed,
            config.difficulty,
            companies.len(),
            deck.eras().len(),
            cash
        );
        Self {
            rng: RandomStream::new(config.seed),
            generator,
            day: 0,
            sectors,
            companies,
            events: EventGenerator::default(),
            deck,
            watch: WatchBook::default(),
            portfolio: Portfolio::new(cash),
            lingering: Vec::new(),
            artifacts,
            pending: None,
            stats: RunStats::default(),
            run_over: None,
            config,
        }
    }

    pub fn with_event_generator(mut self, events: EventGenerator) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Next day to be simulated.
    pub fn day(&self) -> Day {
        self.day
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn company(&self, id: CompanyId) -> Option<&Company> {
        self.companies.iter().find(|c| c.id == id)
    }

    pub fn era(&self) -> &Era {
        self.deck.current()
    }

    pub fn era_deck(&self) -> &EraDeck {
        &self.deck
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn watch_orders(&self) -> &[WatchOrder] {
        self.watch.orders()
    }

    pub fn lingering(&self) -> &[LingeringEffect] {
        &self.lingering
    }

    pub fn artifacts(&self) -> &ArtifactEffects {
        &self.artifacts
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn run_over(&self) -> Option<RunOverReason> {
        self.run_over
    }

    pub fn rng(&self) -> &RandomStream {
        &self.rng
    }

    pub fn pending_event(&self) -> Option<&MarketEvent> {
        self.pending.as_ref().and_then(|p| p.pending_event())
    }

    pub fn watch_capacity(&self) -> usize {
        self.config.base_watch_slots + self.artifacts.trigger_slot_bonus as usize
    }

    fn mode(&self) -> DifficultyMode {
        self.config.difficulty.mode()
    }

    /// Replaces the artifact list and refolds its effects. Starting cash is not revisited.
    pub fn set_artifacts(&mut self, deltas: Vec<EffectDelta>) {
        self.artifacts = ArtifactEffects::fold(&deltas);
        self.config.artifacts = deltas;
        info!(
            "artifacts updated count={} watch_capacity={}",
            self.config.artifacts.len(),
            self.watch_capacity()
        );
    }

    /// Lists a caller-built company (IPO) at the current day. Returns the assigned id.
    pub fn list_company(&mut self, mut company: Company) -> SimResult<CompanyId> {
        if self.generator.has_symbol(&company.symbol) {
            return Err(SimError::DuplicateSymbol(company.symbol));
        }
        let id = CompanyId(self.companies.iter().map(|c| c.id.0).max().unwrap_or(0) + 1);
        company.id = id;
        company.listed_day = self.day;
        company.is_active = true;
        self.generator.register(&company);
        info!("company listed id={} symbol={} price={} day={}", id, company.symbol, company.price, self.day);
        self.companies.push(company);
        Ok(id)
    }

    /// Generates and lists a new company in `sector`. Draws come from the
    /// setup stream, so the tick stream is untouched.
    pub fn list_ipo(&mut self, sector: &str) -> SimResult<CompanyId> {
        if !self.sectors.iter().any(|s| s.name == sector) {
            return Err(SimError::UnknownSector(sector.to_string()));
        }
        let company = self.generator.next_company(sector, self.day);
        let id = company.id;
        info!("company listed id={} symbol={} price={} day={}", id, company.symbol, company.price, self.day);
        self.companies.push(company);
        Ok(id)
    }

    /// Delists a company (bankruptcy). Its history stays.
    pub fn delist_company(&mut self, id: CompanyId) -> SimResult<()> {
        let company = self
            .companies
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(SimError::UnknownCompany(id))?;
        company.delist();
        info!("company delisted id={} symbol={} day={}", id, company.symbol, self.day);
        Ok(())
    }

    pub fn place_watch(&mut self, req: WatchRequest) -> SimResult<OrderId> {
        if self.run_over.is_some() {
            return Err(SimError::RunOver);
        }
        let limit = self.watch_capacity();
        self.watch.place(req, &self.companies, limit, self.day)
    }

    pub fn cancel_watch(&mut self, id: OrderId) -> bool {
        self.watch.cancel(id)
    }

    fn trade_price(&self, id: CompanyId) -> SimResult<Decimal> {
        if self.run_over.is_some() {
            return Err(SimError::RunOver);
        }
        let company = self.company(id).ok_or(SimError::UnknownCompany(id))?;
        if !company.is_active {
            return Err(SimError::InactiveCompany(id));
        }
        to_cents(company.price).ok_or_else(|| SimError::InvalidOrder(format!("no tradable price for {}", id)))
    }

    /// Buys at the current price.
    pub fn buy_now(&mut self, id: CompanyId, shares: u64) -> SimResult<Fill> {
        let price = self.trade_price(id)?;
        self.portfolio.buy(id, shares, price, self.day)
    }

    /// Sells at the current price.
    pub fn sell_now(&mut self, id: CompanyId, shares: u64) -> SimResult<Fill> {
        let price = self.trade_price(id)?;
        self.portfolio.sell(id, shares, price, self.day)
    }

    pub fn advance_day(&mut self) -> SimResult<TickOutcome> {
        self.advance_day_with(&mut NoCollaborators)
    }

    /// Runs one tick. Parks on a player choice.
    pub fn advance_day_with(&mut self, hooks: &mut dyn Collaborators) -> SimResult<TickOutcome> {
        if self.run_over.is_some() {
            return Err(SimError::RunOver);
        }
        if self.pending.is_some() {
            return Err(SimError::ChoicePending);
        }
        let plan = self.plan_day(hooks);
        if let Some(event) = plan.pending_event().cloned() {
            info!("tick awaiting choice day={} template={}", plan.day, event.template_id);
            self.pending = Some(plan);
            return Ok(TickOutcome::AwaitingChoice { day: self.day, event });
        }
        let report = self.complete(plan, hooks);
        Ok(TickOutcome::Completed { report })
    }

    pub fn resolve_choice(&mut self, accept: bool) -> SimResult<DayReport> {
        self.resolve_choice_with(accept, &mut NoCollaborators)
    }

    /// Settles the parked choice and finishes the tick.
    pub fn resolve_choice_with(&mut self, accept: bool, hooks: &mut dyn Collaborators) -> SimResult<DayReport> {
        let mut plan = self.pending.take().ok_or(SimError::NoPendingChoice)?;
        for event in plan.events.iter_mut() {
            if event.resolve(accept) {
                if accept {
                    self.stats.choices_accepted += 1;
                } else {
                    self.stats.choices_declined += 1;
                }
                info!("choice resolved day={} template={} accepted={}", plan.day, event.template_id, accept);
            }
        }
        Ok(self.complete(plan, hooks))
    }

    fn complete(&mut self, plan: DayPlan, hooks: &mut dyn Collaborators) -> DayReport {
        let priced = self.price_stage(plan);
        let settled = self.watch_stage(priced);
        self.finish_day(settled, hooks)
    }

    fn plan_day(&mut self, hooks: &mut dyn Collaborators) -> DayPlan {
        let influence = hooks.pre_tick(self.day, self.deck.current(), &self.companies);
        let era = self.deck.current();
        let chance = self.config.base_event_chance * era.effects.event_frequency_multiplier * self.mode().event_multiplier;
        let chance = if chance.is_finite() { chance.clamp(0.0, 1.0) } else { 0.0 };
        let event = self
            .events
            .draw(&mut self.rng, chance, &self.sectors, &self.companies, &era.event_weights, self.day);
        if event.is_some() {
            self.stats.events_fired += 1;
        }
        DayPlan {
            day: self.day,
            influence,
            events: event.into_iter().collect(),
        }
    }

    fn price_stage(&mut self, plan: DayPlan) -> PricedDay {
        let ctx = PriceContext {
            era: self.deck.current(),
            run_volatility_multiplier: self.config.difficulty.mode().volatility_multiplier
                * self.artifacts.volatility_multiplier,
            negative_event_multiplier: self.artifacts.negative_event_multiplier,
            energy_sector_bonus: self.artifacts.energy_sector_bonus,
            influence: &plan.influence,
            events: &plan.events,
            lingering: &self.lingering,
        };
        let moves = price_market(&mut self.companies, &ctx, &mut self.rng);
        debug!("priced day={} companies={}", plan.day, moves.len());
        PricedDay { plan, moves }
    }

    fn watch_stage(&mut self, priced: PricedDay) -> SettledDay {
        let watch = self.watch.evaluate(priced.plan.day, &self.companies, &mut self.portfolio);
        self.stats.record_watch(&watch);
        SettledDay { priced, watch }
    }

    fn finish_day(&mut self, settled: SettledDay, hooks: &mut dyn Collaborators) -> DayReport {
        let SettledDay { priced, watch } = settled;
        let PricedDay { plan, moves } = priced;
        let day = plan.day;
        let era_name = self.deck.current().name.clone();

        hooks.after_prices(day, &mut self.companies, &mut self.portfolio);

        let no_run_over = self.mode().no_run_over;
        let transition = self
            .deck
            .advance(no_run_over, self.artifacts.era_duration_reduction, &mut self.rng);
        let mut era_notices = Vec::new();
        let mut deck_exhausted = false;
        match &transition {
            EraTransition::Continued => {}
            EraTransition::EraChanged { .. } => self.stats.era_transitions += 1,
            EraTransition::DeckReset { .. } => {
                self.stats.era_transitions += 1;
                self.stats.deck_resets += 1;
            }
            EraTransition::DeckExhausted { .. } => deck_exhausted = true,
        }
        if transition != EraTransition::Continued {
            hooks.on_era_transition(&transition);
            era_notices.push(transition);
        }

        for effect in self.lingering.iter_mut() {
            effect.remaining_days = effect.remaining_days.saturating_sub(1);
        }
        self.lingering.retain(|e| e.remaining_days > 0);
        self.lingering.extend(plan.events.iter().filter_map(|e| e.lingering()));

        self.stats.days_completed += 1;
        self.day += 1;

        let run_over = if deck_exhausted && !no_run_over {
            Some(RunOverReason::DeckExhausted)
        } else if self.config.max_days.is_some_and(|max| self.day >= max) {
            Some(RunOverReason::MaxDays)
        } else {
            None
        };
        if let Some(reason) = run_over {
            info!("run over day={} reason={:?}", day, reason);
        }
        self.run_over = run_over;

        info!(
            "day complete day={} era={} events={} moves={} watch={} cash={}",
            day,
            era_name,
            plan.events.len(),
            moves.len(),
            watch.len(),
            self.portfolio.cash()
        );
        DayReport {
            day,
            era: era_name,
            events: plan.events,
            moves,
            watch,
            era_notices,
            run_over,
        }
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            day: self.day,
            era: self.deck.current().clone(),
            era_day: self.deck.current_era_day(),
            era_index: self.deck.current_era_index(),
            era_deck_cycle: self.deck.era_deck_cycle(),
            cash: self.portfolio.cash(),
            net_worth: self.portfolio.net_worth(&self.companies),
            holdings: self.portfolio.holdings().iter().map(|(id, n)| (*id, *n)).collect(),
            companies: self.companies.clone(),
            watch_orders: self.watch.orders().to_vec(),
            pending_event: self.pending_event().cloned(),
            run_over: self.run_over,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Difficulty;
    use crate::events::{default_event_catalog, ChoiceState, EventScope};
    use crate::rng::RandomSource;
    use crate::types::round2;
    use crate::watch::{TimeInForce, WatchKind};

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn one_company_market(seed: u64, deck: EraDeck) -> Market {
        let config = SimConfig {
            seed,
            base_event_chance: 0.0,
            ..Default::default()
        };
        let company = Company::new(CompanyId(1), "TST", "Test Corp", "Technology", 10.0).with_coefficients(0.05, 0.01, 0.02);
        Market::from_parts(config, vec![Sector::new("Technology", 1.0, 0.3)], vec![company], deck)
    }

    fn flat_deck(days: u32) -> EraDeck {
        EraDeck::new(vec![Era::neutral("flat", days)], default_era_templates())
    }

    fn choice_only() -> EventGenerator {
        EventGenerator::new(
            default_event_catalog()
                .into_iter()
                .filter(|t| t.scope == EventScope::PlayerChoice)
                .collect(),
        )
    }

    fn completed(outcome: TickOutcome) -> DayReport {
        match outcome {
            TickOutcome::Completed { report } => report,
            other => panic!("expected completed tick, got {:?}", other),
        }
    }

    #[test]
    fn seed_42_close_follows_draws_two_to_four() {
        init_log();
        let mut market = one_company_market(42, flat_deck(30));
        let mut expected_stream = market.rng().clone();
        expected_stream.next_f64();
        let z = expected_stream.gaussian();
        let jitter = expected_stream.uniform(-0.02, 0.02);
        let pct = 0.01 + z * 0.05 + jitter;
        let expected = round2(10.0 * (1.0 + pct)).max(0.10);

        let report = completed(market.advance_day().unwrap());
        assert!(report.events.is_empty());
        assert_eq!(report.moves[0].range.close, expected);
        assert_eq!(market.companies()[0].price, expected);
        assert_eq!(market.rng().draws(), 1 + 6);
    }

    #[test]
    fn seed_42_first_close_is_pinned() {
        init_log();
        let mut market = one_company_market(42, flat_deck(30));
        let report = completed(market.advance_day().unwrap());
        let mv = &report.moves[0];
        assert_eq!(mv.range.open, 10.0);
        assert_eq!(mv.range.close, 9.05);
        assert_eq!(mv.change(), -0.95);
        assert!((mv.pct - -0.094_919_614_487_316_76).abs() < 1e-12);
        assert_eq!(market.companies()[0].history, vec![10.0, 9.05]);
    }

    #[test]
    fn same_seed_same_run() {
        init_log();
        let mut a = Market::new(SimConfig::default().with_seed(7));
        let mut b = Market::new(SimConfig::default().with_seed(7));
        for _ in 0..40 {
            for m in [&mut a, &mut b] {
                if let Ok(TickOutcome::AwaitingChoice { .. }) = m.advance_day() {
                    m.resolve_choice(true).unwrap();
                }
            }
        }
        for (x, y) in a.companies().iter().zip(b.companies()) {
            assert_eq!(x.history, y.history);
        }
        assert_eq!(a.era_deck().eras(), b.era_deck().eras());
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn pending_choice_suspends_then_resumes_exactly_once() {
        init_log();
        let mut market = one_company_market(3, flat_deck(30)).with_event_generator(choice_only());
        market.config.base_event_chance = 1.0;
        market
            .place_watch(WatchRequest {
                company: CompanyId(1),
                kind: WatchKind::LimitBuy {
                    max_cash: Decimal::from(100),
                },
                trigger: 1_000.0,
                time_in_force: TimeInForce::Day,
            })
            .unwrap();

        let outcome = market.advance_day().unwrap();
        assert!(matches!(outcome, TickOutcome::AwaitingChoice { day: 0, .. }));
        assert_eq!(market.companies()[0].history.len(), 1);
        assert_eq!(market.watch_orders().len(), 1);
        assert_eq!(market.day(), 0);
        let draws_while_parked = market.rng().draws();
        assert!(matches!(market.advance_day(), Err(SimError::ChoicePending)));
        assert_eq!(market.rng().draws(), draws_while_parked);

        let report = market.resolve_choice(false).unwrap();
        assert_eq!(report.events[0].choice, ChoiceState::Declined);
        assert_eq!(market.companies()[0].history.len(), 2);
        assert_eq!(market.day(), 1);
        assert_eq!(market.stats().choices_declined, 1);
        assert!(market.watch_orders().is_empty());
        assert!(matches!(market.resolve_choice(true), Err(SimError::NoPendingChoice)));
    }

    #[test]
    fn finite_deck_end_clamps_era_and_ends_run() {
        init_log();
        let mut market = one_company_market(1, flat_deck(3));
        for _ in 0..2 {
            completed(market.advance_day().unwrap());
        }
        let report = completed(market.advance_day().unwrap());
        assert_eq!(report.run_over, Some(RunOverReason::DeckExhausted));
        assert_eq!(market.era_deck().current_era_day(), 0);
        assert_eq!(market.era_deck().current_era_index(), 0);
        assert!(matches!(market.advance_day(), Err(SimError::RunOver)));
    }

    #[test]
    fn endless_deck_regenerates_and_keeps_running() {
        init_log();
        let mut market = one_company_market(1, flat_deck(2));
        market.config.difficulty = Difficulty::Endless;
        completed(market.advance_day().unwrap());
        let report = completed(market.advance_day().unwrap());
        assert!(matches!(report.era_notices[..], [EraTransition::DeckReset { cycle: 1, .. }]));
        assert_eq!(market.era_deck().era_deck_cycle(), 1);
        assert_eq!(market.era_deck().current_era_index(), 0);
        assert_eq!(market.era_deck().current_era_day(), 0);
        assert!(market.run_over().is_none());
        assert_eq!(market.stats().deck_resets, 1);
    }

    #[test]
    fn max_days_ends_run() {
        let mut market = one_company_market(1, flat_deck(30));
        market.config.max_days = Some(2);
        completed(market.advance_day().unwrap());
        let report = completed(market.advance_day().unwrap());
        assert_eq!(report.run_over, Some(RunOverReason::MaxDays));
        assert!(matches!(market.buy_now(CompanyId(1), 1), Err(SimError::RunOver)));
    }

    #[test]
    fn history_and_range_invariants_hold_over_a_run() {
        init_log();
        let mut market = Market::new(SimConfig::default().with_seed(11).with_difficulty(Difficulty::Hard));
        let mut ticks = 0;
        while market.run_over().is_none() && ticks < 60 {
            match market.advance_day().unwrap() {
                TickOutcome::AwaitingChoice { .. } => {
                    market.resolve_choice(ticks % 2 == 0).unwrap();
                }
                TickOutcome::Completed { .. } => {}
            }
            ticks += 1;
            for c in market.companies() {
                assert_eq!(c.price, c.today_range.close);
                assert!(c.today_range.is_consistent(), "{:?}", c.today_range);
                assert!(c.price >= 0.10);
                assert_eq!(c.history.len(), ticks + 1);
            }
        }
    }

    #[test]
    fn artifacts_widen_watch_capacity_and_boost_cash() {
        let config = SimConfig {
            artifacts: vec![EffectDelta::TriggerSlotBonus(2), EffectDelta::StartingCashBonus(Decimal::from(500))],
            ..Default::default()
        };
        let mut market = Market::new(config);
        assert_eq!(market.watch_capacity(), 5);
        assert_eq!(market.portfolio().cash(), Decimal::from(10_500));
        market.set_artifacts(vec![]);
        assert_eq!(market.watch_capacity(), 3);
    }

    #[test]
    fn watch_capacity_rejects_extra_orders() {
        let mut market = one_company_market(1, flat_deck(30));
        let req = |trigger: f64| WatchRequest {
            company: CompanyId(1),
            kind: WatchKind::StopLoss { shares: 1 },
            trigger,
            time_in_force: TimeInForce::GoodTillRun,
        };
        for i in 0..3 {
            market.place_watch(req(5.0 + i as f64)).unwrap();
        }
        assert!(matches!(market.place_watch(req(9.0)), Err(SimError::WatchCapacity { limit: 3 })));
        assert_eq!(market.watch_orders().len(), 3);
    }

    #[test]
    fn immediate_trades_settle_at_current_price() {
        let mut market = one_company_market(1, flat_deck(30));
        let fill = market.buy_now(CompanyId(1), 10).unwrap();
        assert_eq!(fill.price, Decimal::from(10));
        assert_eq!(market.portfolio().cash(), Decimal::from(9_900));
        market.sell_now(CompanyId(1), 4).unwrap();
        assert_eq!(market.portfolio().shares(CompanyId(1)), 6);
        assert!(matches!(market.buy_now(CompanyId(9), 1), Err(SimError::UnknownCompany(_))));
        market.delist_company(CompanyId(1)).unwrap();
        assert!(matches!(market.sell_now(CompanyId(1), 1), Err(SimError::InactiveCompany(_))));
    }

    #[test]
    fn listed_company_gets_next_id_and_trades() {
        let mut market = one_company_market(1, flat_deck(30));
        completed(market.advance_day().unwrap());
        let id = market
            .list_company(Company::new(CompanyId(0), "NEW", "Newco", "Technology", 20.0))
            .unwrap();
        assert_eq!(id, CompanyId(2));
        assert_eq!(market.company(id).map(|c| c.listed_day), Some(1));
        let report = completed(market.advance_day().unwrap());
        assert_eq!(report.moves.len(), 2);
        assert!(matches!(
            market.list_company(Company::new(CompanyId(0), "TST", "Copycat", "Technology", 5.0)),
            Err(SimError::DuplicateSymbol(_))
        ));
    }

    #[test]
    fn ipo_listings_never_repeat_symbols_or_ids() {
        init_log();
        let mut market = Market::new(SimConfig::default().with_seed(11));
        let opening = market.companies().len();
        let draws = market.rng().draws();
        let sector = market.sectors()[0].name.clone();
        let ids: Vec<CompanyId> = (0..30).map(|_| market.list_ipo(&sector).unwrap()).collect();
        assert_eq!(market.rng().draws(), draws);
        assert_eq!(ids[0].0, opening as u64 + 1);

        let symbols: std::collections::BTreeSet<&str> = market.companies().iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols.len(), opening + 30);
        let ids: std::collections::BTreeSet<CompanyId> = market.companies().iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), opening + 30);
        assert!(matches!(market.list_ipo("Shipping"), Err(SimError::UnknownSector(_))));
    }

    #[test]
    fn ipo_sequence_survives_save_and_resume() {
        let mut market = Market::new(SimConfig::default().with_seed(12));
        let sector = market.sectors()[1].name.clone();
        market.list_ipo(&sector).unwrap();
        let json = serde_json::to_string(&market).unwrap();
        let mut resumed: Market = serde_json::from_str(&json).unwrap();
        let a = market.list_ipo(&sector).unwrap();
        let b = resumed.list_ipo(&sector).unwrap();
        assert_eq!(a, b);
        assert_eq!(market.company(a).map(|c| &c.symbol), resumed.company(b).map(|c| &c.symbol));
    }

    struct Whale {
        transitions: usize,
        after_prices_calls: usize,
    }

    impl Collaborators for Whale {
        fn pre_tick(&mut self, _day: Day, _era: &Era, _companies: &[Company]) -> MarketInfluence {
            MarketInfluence::default().with_company(CompanyId(1), 5.0)
        }

        fn after_prices(&mut self, _day: Day, _companies: &mut Vec<Company>, _portfolio: &mut Portfolio) {
            self.after_prices_calls += 1;
        }

        fn on_era_transition(&mut self, _transition: &EraTransition) {
            self.transitions += 1;
        }
    }

    #[test]
    fn collaborators_shape_and_observe_the_tick() {
        let mut market = one_company_market(5, EraDeck::new(vec![Era::neutral("a", 1), Era::neutral("b", 5)], vec![]));
        let mut whale = Whale {
            transitions: 0,
            after_prices_calls: 0,
        };
        let report = completed(market.advance_day_with(&mut whale).unwrap());
        assert!(report.moves[0].pct > 4.0);
        assert_eq!(whale.after_prices_calls, 1);
        assert_eq!(whale.transitions, 1);
        assert_eq!(market.era().id, "b");
    }

    #[test]
    fn saved_run_resumes_identically() {
        let mut market = Market::new(SimConfig::default().with_seed(21));
        for _ in 0..5 {
            if let TickOutcome::AwaitingChoice { .. } = market.advance_day().unwrap() {
                market.resolve_choice(true).unwrap();
            }
        }
        let json = serde_json::to_string(&market).unwrap();
        let mut restored: Market = serde_json::from_str(&json).unwrap();
        for _ in 0..5 {
            for m in [&mut market, &mut restored] {
                if let TickOutcome::AwaitingChoice { .. } = m.advance_day().unwrap() {
                    m.resolve_choice(false).unwrap();
                }
            }
        }
        for (x, y) in market.companies().iter().zip(restored.companies()) {
            assert_eq!(x.history, y.history);
        }
        assert_eq!(market.rng().draws(), restored.rng().draws());
    }
}
