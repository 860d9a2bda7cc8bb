use anyhow::{bail, Context};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::{response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api_client;
mod config;
mod csv_store;
mod domain;
mod error;
mod usecases;

use crate::api_client::YahooQuoteProvider;
use crate::config::AppConfig;
use crate::csv_store::{default_holdings, FileCsvStore, HoldingsStore};
use crate::domain::models::{Holding, ValuationRecord};
use crate::domain::registry::HoldingRegistry;
use crate::error::ConfigError;
use crate::usecases::refresh_service::{RefreshScheduler, SchedulerState, SnapshotReader};

#[derive(Clone)]
struct AppState {
    reader: SnapshotReader,
}

#[derive(Serialize)]
struct StatusResponse {
    state: SchedulerState,
    cycle: u64,
    completed_at: Option<DateTime<Utc>>,
    holdings_published: usize,
    failed_symbols: Vec<String>,
    total_market_value: Decimal,
    total_invested_value: Decimal,
}

// Public, read-only: the latest snapshot as an ordered list of records.
#[tracing::instrument(skip(state))]
async fn api_portfolio(State(state): State<AppState>) -> Json<Vec<ValuationRecord>> {
    let snapshot = state.reader.current();
    Json(snapshot.records.clone())
}

#[tracing::instrument(skip(state))]
async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.reader.current();
    Json(StatusResponse {
        state: state.reader.state(),
        cycle: snapshot.cycle,
        completed_at: snapshot.completed_at,
        holdings_published: snapshot.records.len(),
        failed_symbols: snapshot.failed_symbols.clone(),
        total_market_value: snapshot.total_market_value,
        total_invested_value: snapshot.total_invested_value,
    })
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/portfolio", get(api_portfolio))
        .route("/api/portfolio/status", get(api_status))
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ConfigError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);
    match origin {
        None => Ok(layer.allow_origin(Any)),
        Some(origin) => {
            let value = origin.parse::<HeaderValue>().map_err(|e| ConfigError::Env {
                var: "CORS_ORIGIN",
                message: e.to_string(),
            })?;
            Ok(layer.allow_origin(value))
        }
    }
}

fn load_holdings(config: &AppConfig) -> Result<Vec<Holding>, ConfigError> {
    match &config.holdings_csv {
        Some(path) => {
            let holdings = FileCsvStore.read_holdings(path)?;
            info!(path = %path, count = holdings.len(), "Loaded holdings");
            Ok(holdings)
        }
        None => {
            let holdings = default_holdings();
            info!(count = holdings.len(), "HOLDINGS_CSV not set, using built-in holdings");
            Ok(holdings)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let holdings = load_holdings(&config).context("invalid holding list")?;
    let cors = cors_layer(config.cors_origin.as_deref())?;

    let provider = YahooQuoteProvider::new(config.fetch_timeout)?
        .with_base_url(config.quote_api_base.as_str())
        .with_cookie_url(config.quote_cookie_url.as_str());
    let (scheduler, reader) = RefreshScheduler::new(
        HoldingRegistry::new(holdings),
        Arc::new(provider),
        config.refresh_interval,
        config.fetch_timeout,
    );
    let refresher = tokio::spawn(scheduler.run());

    let result = serve(app(AppState { reader }).layer(cors), config.port).await;
    refresher.abort();
    result
}

async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    // Try to bind to the requested port; if it's in use, try a few subsequent ports.
    let max_attempts = 10;
    for offset in 0..max_attempts {
        let Some(try_port) = port.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::from(([127, 0, 0, 1], try_port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!(%addr, "Listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "Server failed while serving");
                    return Err(e.into());
                }
                return Ok(());
            }
            Err(e) => {
                warn!(port = try_port, error = %e, "Port unavailable, trying next");
            }
        }
    }
    bail!(
        "failed to bind to any port in range {}..{}",
        port,
        port.saturating_add(max_attempts - 1)
    )
}
