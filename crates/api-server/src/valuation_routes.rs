//! Valuation API Routes
//!
//! The calculator form posts to `/calculate` and prefills its cash flow
//! field from `/get_initial_cash_flow/:ticker`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use valuation_core::ValuationError;
use valuation_orchestrator::{InitialCashFlow, ValuationReport, ValuationRequest};

use crate::{AppError, AppState};

const DEFAULT_YEARS: u32 = 5;

/// Form payload. Rates are percentages; numbers may arrive as JSON strings.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CalculateRequest {
    #[serde(default)]
    pub ticker: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schema(value_type = Option<f64>, example = 10.0)]
    pub growth_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schema(value_type = Option<f64>, example = 9.0)]
    pub discount_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schema(value_type = Option<f64>, example = 2.5)]
    pub perpetual_growth_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    #[schema(value_type = Option<u32>, example = 5)]
    pub years: Option<u32>,
    /// Base cash flow in currency units; empty or null uses the reported figure.
    #[serde(default, deserialize_with = "lenient_f64")]
    #[schema(value_type = Option<f64>)]
    pub initial_cash_flow: Option<f64>,
}

impl CalculateRequest {
    /// Missing rates count as 0% and missing years as 5, then the usual range checks apply.
    pub fn into_request(self) -> Result<ValuationRequest, ValuationError> {
        ValuationRequest::from_percentages(
            &self.ticker,
            self.growth_rate.unwrap_or(0.0),
            self.discount_rate.unwrap_or(0.0),
            self.perpetual_growth_rate.unwrap_or(0.0),
            self.years.unwrap_or(DEFAULT_YEARS),
            self.initial_cash_flow,
        )
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("'{}' is not a number", s))),
        other => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let Some(value) = lenient_f64(deserializer)? else {
        return Ok(None);
    };
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(D::Error::custom(format!("{} is not a whole number of years", value)));
    }
    Ok(Some(value as u32))
}

pub fn valuation_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate", post(calculate))
        .route("/get_initial_cash_flow/:ticker", get(get_initial_cash_flow))
}

#[utoipa::path(
    post,
    path = "/calculate",
    request_body = CalculateRequest,
    responses(
        (status = 200, description = "DCF valuation with multiples and peer context"),
        (status = 400, description = "Invalid rates, years or ticker"),
        (status = 404, description = "Unknown ticker or no cash flow data"),
        (status = 502, description = "Data provider failure")
    ),
    tag = "Valuation"
)]
pub async fn calculate(
    State(state): State<AppState>,
    payload: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<ValuationReport>, AppError> {
    let Json(body) = payload.map_err(|e| {
        AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(e.body_text()))
    })?;
    let request = body.into_request()?;

    let report = state.orchestrator.calculate(&request).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/get_initial_cash_flow/{ticker}",
    params(("ticker" = String, Path, description = "Stock ticker symbol")),
    responses(
        (status = 200, description = "Latest free or operating cash flow and its fiscal year"),
        (status = 404, description = "No cash flow data for the ticker")
    ),
    tag = "Valuation"
)]
pub async fn get_initial_cash_flow(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<InitialCashFlow>, AppError> {
    let initial = state.orchestrator.initial_cash_flow(&ticker).await?;
    Ok(Json(initial))
}
