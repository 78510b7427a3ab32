use serde::Serialize;
use valuation_core::CashFlowSource;

/// Divisor for the "100M" display unit used by the calculator form.
pub const HUNDRED_MILLION: f64 = 100_000_000.0;

/// Latest reported cash flow, for prefilling the calculator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialCashFlow {
    pub initial_cash_flow: f64,
    pub initial_cash_flow_100m: f64,
    pub source: CashFlowSource,
    /// Fiscal year of the most recent reporting period.
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedValues {
    pub year: Vec<u32>,
    pub cash_flows: Vec<f64>,
    pub present_values: Vec<f64>,
}

/// Current multiples with their historical and sector context.
///
/// A multiple that is missing or not positive is reported as `None`
/// together with both of its percentile fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationMetrics {
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub pe_percentile: Option<f64>,
    pub pb_percentile: Option<f64>,
    pub pe_historical_percentile: Option<f64>,
    pub pb_historical_percentile: Option<f64>,
    /// Sector as the provider labels it; peers are matched on its GICS equivalent.
    pub sector: Option<String>,
    pub industry_avg_pe: Option<f64>,
    pub industry_avg_pb: Option<f64>,
    pub peer_count: usize,
    pub futu_link: String,
}

/// Full result of a valuation run.
///
/// `market_cap`, `shares_outstanding` and `current_price` are 0 when the
/// provider does not report them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationReport {
    pub ticker: String,
    pub company_name: String,
    pub dcf_value: f64,
    pub dcf_per_share: f64,
    pub market_cap: f64,
    pub current_price: f64,
    pub upside_percent: Option<f64>,
    pub shares_outstanding: f64,
    pub initial_cash_flow: f64,
    pub initial_cash_flow_100m: f64,
    pub cash_flow_source: CashFlowSource,
    pub future_cash_flows: Vec<f64>,
    pub present_values: Vec<f64>,
    /// Present value of the terminal value.
    pub terminal_value: f64,
    pub terminal_value_undiscounted: f64,
    pub projected_values: ProjectedValues,
    pub valuation_metrics: ValuationMetrics,
}
