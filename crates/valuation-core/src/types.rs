use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Line item labels as they appear on provider statements.
pub const FREE_CASH_FLOW: &str = "Free Cash Flow";
pub const OPERATING_CASH_FLOW: &str = "Operating Cash Flow";
pub const CAPITAL_EXPENDITURE: &str = "Capital Expenditure";
pub const NET_INCOME: &str = "Net Income";
pub const TOTAL_STOCKHOLDER_EQUITY: &str = "Total Stockholder Equity";

/// Daily OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Point-in-time company metadata. Every field except the ticker may be missing
/// upstream and is carried as `None` rather than failing the fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanySnapshot {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub current_price: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub price_to_book: Option<f64>,
}

impl CompanySnapshot {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            ..Default::default()
        }
    }

    /// Trailing P/E, only when it is a usable positive number.
    pub fn positive_pe(&self) -> Option<f64> {
        positive(self.trailing_pe)
    }

    /// Price-to-book, only when it is a usable positive number.
    pub fn positive_pb(&self) -> Option<f64> {
        positive(self.price_to_book)
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// One reported value for an accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodValue {
    pub period_end: NaiveDate,
    pub value: f64,
}

impl PeriodValue {
    pub fn new(period_end: NaiveDate, value: f64) -> Self {
        Self { period_end, value }
    }
}

/// Where the base cash flow of a projection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashFlowSource {
    #[serde(rename = "Free Cash Flow")]
    FreeCashFlow,
    #[serde(rename = "Operating Cash Flow")]
    OperatingCashFlow,
    #[serde(rename = "User Provided")]
    UserProvided,
}

impl CashFlowSource {
    pub fn label(&self) -> &'static str {
        match self {
            CashFlowSource::FreeCashFlow => FREE_CASH_FLOW,
            CashFlowSource::OperatingCashFlow => OPERATING_CASH_FLOW,
            CashFlowSource::UserProvided => "User Provided",
        }
    }
}

/// Annual cash flow statement keyed by line item label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub rows: BTreeMap<String, Vec<PeriodValue>>,
}

impl CashFlowStatement {
    pub fn with_row(mut self, label: &str, mut values: Vec<PeriodValue>) -> Self {
        values.sort_by_key(|v| v.period_end);
        self.rows.insert(label.to_string(), values);
        self
    }

    /// A statement with no populated rows at all.
    pub fn is_empty(&self) -> bool {
        self.rows.values().all(|r| r.is_empty())
    }

    pub fn row(&self, label: &str) -> Option<&[PeriodValue]> {
        self.rows
            .get(label)
            .map(|r| r.as_slice())
            .filter(|r| !r.is_empty())
    }

    /// Pick the series a projection should start from: free cash flow when
    /// reported, operating cash flow otherwise.
    pub fn base_series(&self) -> Result<CashFlowSeries, crate::ValuationError> {
        if self.is_empty() {
            return Err(crate::ValuationError::NoFinancialData);
        }
        let (source, row) = match self.row(FREE_CASH_FLOW) {
            Some(row) => (CashFlowSource::FreeCashFlow, row),
            None => match self.row(OPERATING_CASH_FLOW) {
                Some(row) => (CashFlowSource::OperatingCashFlow, row),
                None => return Err(crate::ValuationError::NoCashFlowData),
            },
        };
        Ok(CashFlowSeries::new(source, row.to_vec()))
    }
}

/// Date-ordered cash flow figures from a single line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowSeries {
    pub source: CashFlowSource,
    pub points: Vec<PeriodValue>,
}

impl CashFlowSeries {
    pub fn new(source: CashFlowSource, mut points: Vec<PeriodValue>) -> Self {
        points.sort_by_key(|p| p.period_end);
        Self { source, points }
    }

    /// Most recent reported period.
    pub fn latest(&self) -> Option<&PeriodValue> {
        self.points.last()
    }
}

/// Quarterly income and balance sheet items used for historical multiples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarterlyFinancials {
    pub net_income: Vec<PeriodValue>,
    pub stockholders_equity: Vec<PeriodValue>,
}

impl QuarterlyFinancials {
    pub fn is_empty(&self) -> bool {
        self.net_income.is_empty() && self.stockholders_equity.is_empty()
    }
}
