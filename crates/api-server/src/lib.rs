use anyhow::Context;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use sector_peers::{SectorUniverse, WikipediaSp500Universe};
use valuation_core::{FinancialDataProvider, ValuationError};
use valuation_orchestrator::{OrchestratorConfig, ValuationOrchestrator};
use yahoo_client::YahooClient;

pub mod config;
mod embedded_frontend;
mod request_id;
mod valuation_routes;

#[cfg(test)]
mod route_tests;

use config::{LogFormat, ServerConfig};

const DEFAULT_LOG_FILTER: &str =
    "api_server=info,valuation_orchestrator=info,yahoo_client=warn,sector_peers=info";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ValuationOrchestrator>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn FinancialDataProvider>,
        universe: Arc<dyn SectorUniverse>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(ValuationOrchestrator::new(provider, universe, config)),
        }
    }
}

/// Handler error: a status code and a message rendered as `{"error": message}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

impl From<ValuationError> for AppError {
    fn from(err: ValuationError) -> Self {
        let status = match &err {
            ValuationError::NotFound(_)
            | ValuationError::NoFinancialData
            | ValuationError::NoCashFlowData => StatusCode::NOT_FOUND,
            ValuationError::InvalidInput(_) | ValuationError::InvalidTerminalAssumption { .. } => {
                StatusCode::BAD_REQUEST
            }
            ValuationError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        };
        Self::with_status(status, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.error.to_string();
        if self.status.is_server_error() {
            tracing::error!("Request failed ({}): {:#}", self.status, self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, message);
        }
        (self.status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FairValue API",
        description = "Discounted cash flow valuation with historical and sector multiples"
    ),
    paths(
        valuation_routes::calculate,
        valuation_routes::get_initial_cash_flow,
        health_check
    ),
    components(schemas(valuation_routes::CalculateRequest)),
    tags(
        (name = "Valuation", description = "DCF calculation and cash flow lookup"),
        (name = "System", description = "Service health")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "System"
)]
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(embedded_frontend::index))
        .route("/static/*path", get(embedded_frontend::static_asset))
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(valuation_routes::valuation_routes())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let config = ServerConfig::from_env();
    tracing::info!(
        "Config: rate limit {}/min, peer cap {}, history {}y",
        config.yahoo_rate_limit,
        config.peer_sample_cap,
        config.history_years
    );

    let provider = Arc::new(YahooClient::new(config.yahoo_rate_limit));
    let universe = Arc::new(WikipediaSp500Universe::new(config.constituents_url.clone()));
    let state = AppState::new(provider, universe, config.orchestrator_config());
    let app = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("FairValue listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}
