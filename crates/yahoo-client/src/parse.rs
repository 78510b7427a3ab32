//! Decoding of Yahoo Finance JSON payloads into domain types.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use valuation_core::{Bar, CompanySnapshot, PeriodValue, ValuationError};

/// Numeric field that Yahoo reports either bare or as `{"raw": .., "fmt": ..}`.
fn raw_f64(module: Option<&Value>, field: &str) -> Option<f64> {
    let value = module?.get(field)?;
    value
        .get("raw")
        .and_then(|v| v.as_f64())
        .or_else(|| value.as_f64())
        .filter(|v| v.is_finite())
}

fn string_field(module: Option<&Value>, field: &str) -> Option<String> {
    module?
        .get(field)?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decode a `quoteSummary` response.
pub fn parse_quote_summary(ticker: &str, json: &Value) -> Result<CompanySnapshot, ValuationError> {
    let summary = json
        .get("quoteSummary")
        .ok_or_else(|| ValuationError::UpstreamFailure("Malformed quote summary response".into()))?;

    let result = summary
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());

    let Some(data) = result else {
        if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
            tracing::debug!("Quote summary error for {}: {}", ticker, err);
        }
        return Err(ValuationError::NotFound(ticker.to_string()));
    };

    let price = data.get("price");
    let detail = data.get("summaryDetail");
    let stats = data.get("defaultKeyStatistics");
    let profile = data.get("assetProfile");
    let financial = data.get("financialData");

    Ok(CompanySnapshot {
        ticker: ticker.to_string(),
        name: string_field(price, "longName").or_else(|| string_field(price, "shortName")),
        sector: string_field(profile, "sector"),
        market_cap: raw_f64(price, "marketCap").or_else(|| raw_f64(detail, "marketCap")),
        shares_outstanding: raw_f64(stats, "sharesOutstanding"),
        current_price: raw_f64(financial, "currentPrice")
            .or_else(|| raw_f64(price, "regularMarketPrice")),
        trailing_pe: raw_f64(detail, "trailingPE"),
        price_to_book: raw_f64(stats, "priceToBook"),
    })
}

/// Decode a `v8/finance/chart` response into daily bars. Rows without a close are skipped.
pub fn parse_chart(ticker: &str, json: &Value) -> Result<Vec<Bar>, ValuationError> {
    let chart = json
        .get("chart")
        .ok_or_else(|| ValuationError::UpstreamFailure("Malformed chart response".into()))?;

    let Some(result) = chart
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
    else {
        return Err(ValuationError::NotFound(ticker.to_string()));
    };

    // A listed ticker with no trades in range has no timestamp array at all
    let Some(timestamps) = result.get("timestamp").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    let quote = result
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ValuationError::UpstreamFailure("No quote data in chart response".into()))?;

    let column = |name: &str| -> Vec<Option<f64>> {
        quote
            .get(name)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().map(|v| v.as_f64()).collect())
            .unwrap_or_default()
    };
    let opens = column("open");
    let highs = column("high");
    let lows = column("low");
    let closes = column("close");
    let volumes = column("volume");
    let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let (Some(ts), Some(close)) = (ts.as_i64(), at(&closes, i)) else {
            continue;
        };
        let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        bars.push(Bar {
            timestamp,
            open: at(&opens, i).unwrap_or(close),
            high: at(&highs, i).unwrap_or(close),
            low: at(&lows, i).unwrap_or(close),
            close,
            volume: at(&volumes, i).unwrap_or(0.0),
        });
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Decode a fundamentals time series response into `type -> values` (date ordered).
pub fn parse_timeseries(json: &Value) -> Result<HashMap<String, Vec<PeriodValue>>, ValuationError> {
    let results = json
        .get("timeseries")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| ValuationError::UpstreamFailure("Malformed timeseries response".into()))?;

    let mut series: HashMap<String, Vec<PeriodValue>> = HashMap::new();
    for result in results {
        let Some(series_type) = result
            .get("meta")
            .and_then(|m| m.get("type"))
            .and_then(|t| t.as_array())
            .and_then(|arr| arr.first())
            .and_then(|t| t.as_str())
        else {
            continue;
        };

        let mut values: Vec<PeriodValue> = result
            .get(series_type)
            .and_then(|v| v.as_array())
            .map(|entries| entries.iter().filter_map(parse_period_value).collect())
            .unwrap_or_default();
        values.sort_by_key(|v| v.period_end);

        series.entry(series_type.to_string()).or_default().extend(values);
    }
    Ok(series)
}

fn parse_period_value(entry: &Value) -> Option<PeriodValue> {
    let date = entry.get("asOfDate")?.as_str()?;
    let period_end = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let value = raw_f64(Some(entry), "reportedValue")?;
    Some(PeriodValue::new(period_end, value))
}
