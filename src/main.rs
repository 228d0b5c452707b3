//! HTTP server driving one market run.
//!
//! Endpoints: health, market snapshot, advance day, resolve choice, watch
//! orders, immediate trades. `STATE_FILE` enables save-after-change and resume
//! on startup; `MARKET_*` variables configure a fresh run.

use era_market::api;
use era_market::persistence::FilePersistence;
use era_market::{Market, SimConfig};
use log::{error, info};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let persistence = std::env::var("STATE_FILE").ok().map(FilePersistence::new);

    let resumed = match &persistence {
        Some(p) => match p.load() {
            Ok(run) => run,
            Err(e) => {
                error!("cannot load saved run: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };
    let market = match resumed {
        Some(run) => {
            info!("resuming run saved_at_day={}", run.saved_at_day);
            run.market
        }
        None => Market::new(SimConfig::from_env()),
    };

    let app = api::create_router(market, persistence);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("cannot bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("listening on http://{}", addr);
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("server error: {}", e);
    }
}
