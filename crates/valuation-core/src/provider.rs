use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{Bar, CashFlowSeries, CashFlowStatement, CompanySnapshot, QuarterlyFinancials, ValuationError};

/// Source of per-ticker market and statement data.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Company metadata. Fails with `NotFound` for unknown tickers only;
    /// individual missing fields come back as `None`.
    async fn company_snapshot(&self, ticker: &str) -> Result<CompanySnapshot, ValuationError>;

    /// Daily bars between `from` and `to`, ordered by date.
    async fn price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ValuationError>;

    /// Annual cash flow statement rows.
    async fn cash_flow_statement(&self, ticker: &str) -> Result<CashFlowStatement, ValuationError>;

    /// Quarterly net income and stockholders' equity.
    async fn quarterly_financials(&self, ticker: &str) -> Result<QuarterlyFinancials, ValuationError>;

    async fn cash_flow_history(&self, ticker: &str) -> Result<CashFlowSeries, ValuationError> {
        self.cash_flow_statement(ticker).await?.base_series()
    }
}
