use super::*;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request as HttpRequest};
use chrono::NaiveDate;
use sector_peers::{Constituent, StaticUniverse};
use serde_json::Value;
use tower::ServiceExt;
use valuation_core::{
    CashFlowStatement, CompanySnapshot, InMemoryProvider, PeriodValue, FREE_CASH_FLOW,
    OPERATING_CASH_FLOW,
};

fn router(provider: InMemoryProvider) -> Router {
    let universe = StaticUniverse::new(vec![
        Constituent::new("ACME", "Industrials"),
        Constituent::new("BOLT", "Industrials"),
    ]);
    let state = AppState::new(
        Arc::new(provider),
        Arc::new(universe),
        OrchestratorConfig::default(),
    );
    build_router(state)
}

fn provider() -> InMemoryProvider {
    let year_end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    InMemoryProvider::new()
        .with_snapshot(CompanySnapshot {
            name: Some("Acme Industries".into()),
            sector: Some("Industrials".into()),
            market_cap: Some(5.0e9),
            shares_outstanding: Some(1.0e8),
            current_price: Some(50.0),
            trailing_pe: Some(18.0),
            price_to_book: Some(2.5),
            ..CompanySnapshot::new("ACME")
        })
        .with_snapshot(CompanySnapshot {
            trailing_pe: Some(22.0),
            price_to_book: Some(3.5),
            ..CompanySnapshot::new("BOLT")
        })
        .with_snapshot(CompanySnapshot::new("EMPTY"))
        .with_cash_flows(
            "ACME",
            CashFlowStatement::default()
                .with_row(FREE_CASH_FLOW, vec![PeriodValue::new(year_end, 4.0e8)])
                .with_row(OPERATING_CASH_FLOW, vec![PeriodValue::new(year_end, 6.0e8)]),
        )
        .with_failure("FLAKY", "connection reset by peer")
}

async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> HttpRequest<Body> {
    HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(router(provider()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_initial_cash_flow() {
    let (status, body) = send(router(provider()), get("/get_initial_cash_flow/acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initial_cash_flow"], 4.0e8);
    assert_eq!(body["initial_cash_flow_100m"], 4.0);
    assert_eq!(body["source"], "Free Cash Flow");
    assert_eq!(body["year"], 2024);
}

#[tokio::test]
async fn test_initial_cash_flow_without_statement() {
    let (status, body) = send(router(provider()), get("/get_initial_cash_flow/EMPTY")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No financial data available for this ticker");
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let (status, body) = send(router(provider()), get("/get_initial_cash_flow/FLAKY")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Error fetching data: connection reset by peer");
}

#[tokio::test]
async fn test_calculate() {
    let request = post_json(
        "/calculate",
        json!({
            "ticker": "acme",
            "growth_rate": "5",
            "discount_rate": "10",
            "perpetual_growth_rate": "2",
            "years": "5",
            "initial_cash_flow": null
        }),
    );
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["company_name"], "Acme Industries");
    assert_eq!(body["cash_flow_source"], "Free Cash Flow");
    assert_eq!(body["projected_values"]["year"], json!([1, 2, 3, 4, 5]));
    assert_eq!(body["future_cash_flows"].as_array().unwrap().len(), 5);
    assert!(body["dcf_value"].as_f64().unwrap() > 0.0);
    assert!(body["upside_percent"].is_number());

    let metrics = &body["valuation_metrics"];
    assert_eq!(metrics["sector"], "Industrials");
    assert_eq!(metrics["industry_avg_pe"], 22.0);
    assert_eq!(metrics["industry_avg_pb"], 3.5);
    assert_eq!(metrics["peer_count"], 1);
    assert_eq!(metrics["pe_ratio"], 18.0);
    // no price history registered, so no percentile
    assert!(metrics["pe_historical_percentile"].is_null());
    assert_eq!(metrics["futu_link"], "https://www.futunn.com/stock/ACME-US");
}

#[tokio::test]
async fn test_calculate_with_override() {
    let request = post_json(
        "/calculate",
        json!({
            "ticker": "ACME",
            "growth_rate": 0,
            "discount_rate": 10,
            "perpetual_growth_rate": 0,
            "years": 1,
            "initial_cash_flow": 1.0e8
        }),
    );
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cash_flow_source"], "User Provided");
    assert_eq!(body["initial_cash_flow_100m"], 1.0);
    // 1e8 / 1.1 + (1e8 / 0.1) / 1.1
    let expected = 1.0e8 / 1.1 + 1.0e9 / 1.1;
    assert!((body["dcf_value"].as_f64().unwrap() - expected).abs() < 1e-3);
}

#[tokio::test]
async fn test_calculate_rejects_equal_rates() {
    let request = post_json(
        "/calculate",
        json!({"ticker": "ACME", "growth_rate": 5, "discount_rate": 5, "perpetual_growth_rate": 5, "years": 5}),
    );
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("must be greater than"));
}

#[tokio::test]
async fn test_calculate_unknown_ticker() {
    let request = post_json(
        "/calculate",
        json!({"ticker": "ZZZZ", "growth_rate": 5, "discount_rate": 9, "perpetual_growth_rate": 2}),
    );
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Ticker not found: ZZZZ");
}

#[tokio::test]
async fn test_calculate_malformed_body() {
    let request = post_json("/calculate", json!({"ticker": "ACME", "growth_rate": "ten"}));
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_calculate_empty_ticker() {
    let request = post_json(
        "/calculate",
        json!({"ticker": "  ", "growth_rate": 5, "discount_rate": 9, "perpetual_growth_rate": 2}),
    );
    let (status, body) = send(router(provider()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input: ticker is required");
}

#[tokio::test]
async fn test_index_page_and_request_id() {
    let response = router(provider()).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(request_id::REQUEST_ID_HEADER));
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
}

#[tokio::test]
async fn test_openapi_document() {
    let (status, body) = send(router(provider()), get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/calculate"].is_object());
    assert!(body["paths"]["/get_initial_cash_flow/{ticker}"].is_object());
}
