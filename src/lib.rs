//! # Era Market
//!
//! Deterministic daily-tick engine for a synthetic multi-day stock market:
//! random events, macro eras, per-company price paths with intraday ranges,
//! and conditional watch orders, all driven by one seeded random stream.
//!
//! ## Entry point
//!
//! Use [`Market`] as the single entry point: create with [`Market::new`], then
//! [`Market::advance_day`] once per day. A tick that fires a player-choice
//! event parks until [`Market::resolve_choice`].
//!
//! ## Example
//!
//! ```rust
//! use era_market::{Market, SimConfig, TickOutcome};
//!
//! let mut market = Market::new(SimConfig::default().with_seed(42));
//! match market.advance_day().unwrap() {
//!     TickOutcome::AwaitingChoice { .. } => {
//!         market.resolve_choice(true).unwrap();
//!     }
//!     TickOutcome::Completed { report } => assert_eq!(report.day, 0),
//! }
//! assert_eq!(market.day(), 1);
//! ```
//!
//! ## Lower-level API
//!
//! [`price_company`], [`EventGenerator::draw`], [`WatchBook::evaluate`] and
//! [`EraDeck::advance`] are usable on their own with any [`RandomSource`].

pub mod api;
pub mod collaborators;
pub mod config;
pub mod effects;
pub mod engine;
pub mod era;
pub mod error;
pub mod events;
pub mod market_gen;
pub mod persistence;
pub mod portfolio;
pub mod pricing;
pub mod rng;
pub mod types;
pub mod watch;

pub use collaborators::{Collaborators, NoCollaborators};
pub use config::SimConfig;
pub use effects::{ArtifactEffects, Difficulty, DifficultyMode, EffectDelta, MarketInfluence};
pub use engine::{DayReport, Market, MarketSnapshot, RunOverReason, RunStats, TickOutcome};
pub use era::{Era, EraDeck, EraEffects, EraTransition};
pub use error::{SimError, SimResult};
pub use events::{EventGenerator, MarketEvent};
pub use market_gen::{Generator, GeneratorConfig};
pub use portfolio::{Fill, Portfolio};
pub use pricing::{price_company, PriceContext, PriceMove};
pub use rng::{RandomSource, RandomStream, ScriptedSource};
pub use types::{Company, CompanyId, Day, IntradayRange, OrderId, Sector};
pub use watch::{TimeInForce, WatchBook, WatchKind, WatchOrder, WatchOutcome, WatchRequest};
