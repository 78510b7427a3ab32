use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    Bar, CashFlowStatement, CompanySnapshot, FinancialDataProvider, QuarterlyFinancials,
    ValuationError,
};

/// Provider backed by in-process tables.
///
/// Tickers registered with [`InMemoryProvider::with_failure`] fail every call
/// with `UpstreamFailure`; unknown tickers fail with `NotFound`.
#[derive(Default)]
pub struct InMemoryProvider {
    snapshots: HashMap<String, CompanySnapshot>,
    bars: HashMap<String, Vec<Bar>>,
    cash_flows: HashMap<String, CashFlowStatement>,
    quarterly: HashMap<String, QuarterlyFinancials>,
    failures: HashMap<String, String>,
    snapshot_calls: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: CompanySnapshot) -> Self {
        self.snapshots.insert(snapshot.ticker.clone(), snapshot);
        self
    }

    pub fn with_bars(mut self, ticker: &str, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        self.bars.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_cash_flows(mut self, ticker: &str, statement: CashFlowStatement) -> Self {
        self.cash_flows.insert(ticker.to_string(), statement);
        self
    }

    pub fn with_quarterly(mut self, ticker: &str, financials: QuarterlyFinancials) -> Self {
        self.quarterly.insert(ticker.to_string(), financials);
        self
    }

    pub fn with_failure(mut self, ticker: &str, message: &str) -> Self {
        self.failures.insert(ticker.to_string(), message.to_string());
        self
    }

    /// Number of `company_snapshot` calls served so far.
    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::Relaxed)
    }

    fn check(&self, ticker: &str) -> Result<(), ValuationError> {
        if let Some(message) = self.failures.get(ticker) {
            return Err(ValuationError::UpstreamFailure(message.clone()));
        }
        if !self.snapshots.contains_key(ticker) {
            return Err(ValuationError::NotFound(ticker.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FinancialDataProvider for InMemoryProvider {
    async fn company_snapshot(&self, ticker: &str) -> Result<CompanySnapshot, ValuationError> {
        self.snapshot_calls.fetch_add(1, Ordering::Relaxed);
        self.check(ticker)?;
        self.snapshots
            .get(ticker)
            .cloned()
            .ok_or_else(|| ValuationError::NotFound(ticker.to_string()))
    }

    async fn price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ValuationError> {
        self.check(ticker)?;
        Ok(self
            .bars
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date() >= from && b.date() <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn cash_flow_statement(&self, ticker: &str) -> Result<CashFlowStatement, ValuationError> {
        self.check(ticker)?;
        Ok(self.cash_flows.get(ticker).cloned().unwrap_or_default())
    }

    async fn quarterly_financials(&self, ticker: &str) -> Result<QuarterlyFinancials, ValuationError> {
        self.check(ticker)?;
        match self.quarterly.get(ticker) {
            Some(q) if !q.is_empty() => Ok(q.clone()),
            _ => Err(ValuationError::NoFinancialData),
        }
    }
}
