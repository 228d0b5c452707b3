//! REST API router driving one run.
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::warn;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::Market;
use crate::error::SimError;
use crate::persistence::FilePersistence;
use crate::types::{CompanyId, OrderId};
use crate::watch::{TimeInForce, WatchKind, WatchRequest};

/// Shared app state: one run per process, ticks serialized by the mutex.
#[derive(Clone)]
pub struct AppState {
    pub(crate) market: Arc<Mutex<Market>>,
    pub(crate) persistence: Option<FilePersistence>,
}

impl AppState {
    fn lock(&self) -> MutexGuard<'_, Market> {
        self.market.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, market: &Market) {
        if let Some(p) = &self.persistence {
            if let Err(e) = p.save(market) {
                warn!("failed to persist run day={} err={}", market.day(), e);
            }
        }
    }
}

/// Builds the REST router with state. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(market: Market, persistence: Option<FilePersistence>) -> Router<()> {
    let state = AppState {
        market: Arc::new(Mutex::new(market)),
        persistence,
    };
    Router::new()
        .route("/health", get(health))
        .route("/market", get(market_snapshot))
        .route("/day/advance", post(advance_day))
        .route("/day/choice", post(resolve_choice))
        .route("/orders/watch", post(place_watch))
        .route("/orders/watch/cancel", post(cancel_watch))
        .route("/orders/trade", post(trade))
        .layer(Extension(state))
}

fn error_response(e: SimError) -> Response {
    let status = match &e {
        SimError::WatchCapacity { .. } | SimError::ChoicePending | SimError::NoPendingChoice | SimError::RunOver => {
            StatusCode::CONFLICT
        }
        SimError::Io(_) | SimError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn market_snapshot(Extension(state): Extension<AppState>) -> Response {
    let guard = state.lock();
    (StatusCode::OK, Json(guard.snapshot())).into_response()
}

async fn advance_day(Extension(state): Extension<AppState>) -> Response {
    let mut guard = state.lock();
    match guard.advance_day() {
        Ok(outcome) => {
            state.persist(&guard);
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct ChoiceRequest {
    accept: bool,
}

async fn resolve_choice(Extension(state): Extension<AppState>, Json(body): Json<ChoiceRequest>) -> Response {
    let mut guard = state.lock();
    match guard.resolve_choice(body.accept) {
        Ok(report) => {
            state.persist(&guard);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct WatchBody {
    company_id: u64,
    /// `limit-buy`, `limit-sell` or `stop-loss`.
    order_type: String,
    trigger: f64,
    max_cash: Option<Decimal>,
    shares: Option<u64>,
    time_in_force: Option<TimeInForce>,
}

impl WatchBody {
    fn into_request(self) -> Result<WatchRequest, SimError> {
        let missing = |field: &str| SimError::InvalidOrder(format!("{} requires {}", self.order_type, field));
        let kind = match self.order_type.as_str() {
            "limit-buy" => WatchKind::LimitBuy {
                max_cash: self.max_cash.ok_or_else(|| missing("max_cash"))?,
            },
            "limit-sell" => WatchKind::LimitSell {
                shares: self.shares.ok_or_else(|| missing("shares"))?,
            },
            "stop-loss" => WatchKind::StopLoss {
                shares: self.shares.ok_or_else(|| missing("shares"))?,
            },
            other => return Err(SimError::InvalidOrder(format!("unknown order_type '{}'", other))),
        };
        Ok(WatchRequest {
            company: CompanyId(self.company_id),
            kind,
            trigger: self.trigger,
            time_in_force: self.time_in_force.unwrap_or(TimeInForce::GoodTillRun),
        })
    }
}

async fn place_watch(Extension(state): Extension<AppState>, Json(body): Json<WatchBody>) -> Response {
    let req = match body.into_request() {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    let mut guard = state.lock();
    match guard.place_watch(req) {
        Ok(id) => {
            state.persist(&guard);
            (StatusCode::OK, Json(serde_json::json!({ "order_id": id.0 }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct CancelRequest {
    order_id: u64,
}

async fn cancel_watch(Extension(state): Extension<AppState>, Json(body): Json<CancelRequest>) -> Response {
    let mut guard = state.lock();
    let removed = guard.cancel_watch(OrderId(body.order_id));
    if removed {
        state.persist(&guard);
    }
    #[derive(serde::Serialize)]
    struct Out {
        canceled: bool,
    }
    (StatusCode::OK, Json(Out { canceled: removed })).into_response()
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum TradeSide {
    Buy,
    Sell,
}

#[derive(serde::Deserialize)]
struct TradeRequest {
    company_id: u64,
    side: TradeSide,
    shares: u64,
}

async fn trade(Extension(state): Extension<AppState>, Json(body): Json<TradeRequest>) -> Response {
    let mut guard = state.lock();
    let id = CompanyId(body.company_id);
    let result = match body.side {
        TradeSide::Buy => guard.buy_now(id, body.shares),
        TradeSide::Sell => guard.sell_now(id, body.shares),
    };
    match result {
        Ok(fill) => {
            state.persist(&guard);
            (StatusCode::OK, Json(fill)).into_response()
        }
        Err(e) => error_response(e),
    }
}
