use chrono::{Datelike, Days, Utc};
use dcf_engine::{upside_percent, DcfAssumptions, DcfEngine, MultipleHistory, MultiplePercentiles};
use sector_peers::{PeerAggregator, SectorUniverse, DEFAULT_PEER_SAMPLE_CAP};
use std::sync::Arc;
use valuation_core::{CashFlowSource, CompanySnapshot, FinancialDataProvider, ValuationError};

pub mod report;
pub use report::{
    InitialCashFlow, ProjectedValues, ValuationMetrics, ValuationReport, HUNDRED_MILLION,
};

pub const DEFAULT_HISTORY_YEARS: u32 = 10;
pub const DEFAULT_PEER_LINK_BASE: &str = "https://www.futunn.com/stock";

/// Computation settings for the valuation pipeline.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Lookback window for historical multiples.
    pub history_years: u32,
    pub peer_sample_cap: usize,
    pub peer_link_base: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_years: DEFAULT_HISTORY_YEARS,
            peer_sample_cap: DEFAULT_PEER_SAMPLE_CAP,
            peer_link_base: DEFAULT_PEER_LINK_BASE.to_string(),
        }
    }
}

/// Validated input for one valuation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationRequest {
    pub ticker: String,
    pub assumptions: DcfAssumptions,
    /// Replaces the reported cash flow as the projection base.
    pub initial_cash_flow: Option<f64>,
}

impl ValuationRequest {
    /// Rates are percentages as typed on the form.
    pub fn from_percentages(
        ticker: &str,
        growth_pct: f64,
        discount_pct: f64,
        terminal_pct: f64,
        years: u32,
        initial_cash_flow: Option<f64>,
    ) -> Result<Self, ValuationError> {
        let ticker = normalize_ticker(ticker)?;
        let assumptions =
            DcfAssumptions::from_percentages(growth_pct, discount_pct, terminal_pct, years)?;
        if let Some(value) = initial_cash_flow {
            if !value.is_finite() {
                return Err(ValuationError::InvalidInput(format!(
                    "initial_cash_flow must be a finite number, got {}",
                    value
                )));
            }
        }
        Ok(Self {
            ticker,
            assumptions,
            initial_cash_flow,
        })
    }
}

/// Trimmed, upper-cased ticker. Empty input is rejected.
pub fn normalize_ticker(raw: &str) -> Result<String, ValuationError> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ValuationError::InvalidInput("ticker is required".to_string()));
    }
    Ok(ticker)
}

/// Link to the ticker's page on the peer comparison site.
pub fn peer_link(base: &str, ticker: &str) -> String {
    format!("{}/{}-US", base.trim_end_matches('/'), ticker)
}

/// Runs the valuation pipeline: company snapshot, sector peers, historical
/// percentiles, then the DCF projection.
pub struct ValuationOrchestrator {
    provider: Arc<dyn FinancialDataProvider>,
    peers: PeerAggregator,
    engine: DcfEngine,
    config: OrchestratorConfig,
}

impl ValuationOrchestrator {
    pub fn new(
        provider: Arc<dyn FinancialDataProvider>,
        universe: Arc<dyn SectorUniverse>,
        config: OrchestratorConfig,
    ) -> Self {
        let peers = PeerAggregator::new(provider.clone(), universe)
            .with_sample_cap(config.peer_sample_cap);
        Self {
            provider,
            peers,
            engine: DcfEngine::new(),
            config,
        }
    }

    /// Most recent free (or operating) cash flow and its fiscal year.
    pub async fn initial_cash_flow(&self, ticker: &str) -> Result<InitialCashFlow, ValuationError> {
        let ticker = normalize_ticker(ticker)?;
        let series = self.provider.cash_flow_history(&ticker).await?;
        let latest = series.latest().ok_or(ValuationError::NoCashFlowData)?;

        tracing::debug!(
            "Initial cash flow for {}: {} ({}, {})",
            ticker,
            latest.value,
            series.source.label(),
            latest.period_end
        );

        Ok(InitialCashFlow {
            initial_cash_flow: latest.value,
            initial_cash_flow_100m: latest.value / HUNDRED_MILLION,
            source: series.source,
            year: latest.period_end.year(),
        })
    }

    pub async fn calculate(&self, request: &ValuationRequest) -> Result<ValuationReport, ValuationError> {
        let ticker = request.ticker.as_str();
        tracing::info!(
            "Starting valuation for {} (growth {:.4}, discount {:.4}, terminal {:.4}, {} years)",
            ticker,
            request.assumptions.growth_rate,
            request.assumptions.discount_rate,
            request.assumptions.terminal_growth_rate,
            request.assumptions.years
        );

        let snapshot = self.provider.company_snapshot(ticker).await?;
        let comparison = self.peers.compare(ticker, snapshot.sector.as_deref()).await;

        let pe_ratio = snapshot.positive_pe();
        let pb_ratio = snapshot.positive_pb();
        let percentiles = self.historical_percentiles(&snapshot, pe_ratio, pb_ratio).await;

        let (base_cash_flow, source) = match request.initial_cash_flow {
            Some(value) => (value, CashFlowSource::UserProvided),
            None => {
                let series = self.provider.cash_flow_history(ticker).await?;
                let latest = series.latest().ok_or(ValuationError::NoCashFlowData)?;
                (latest.value, series.source)
            }
        };

        let valuation =
            self.engine
                .compute(base_cash_flow, &request.assumptions, snapshot.shares_outstanding)?;

        tracing::info!(
            "Valuation for {}: total {:.0}, per share {:.2} from {} base",
            ticker,
            valuation.total_value,
            valuation.per_share_value,
            source.label()
        );

        Ok(ValuationReport {
            ticker: ticker.to_string(),
            company_name: snapshot.name.clone().unwrap_or_else(|| ticker.to_string()),
            dcf_value: valuation.total_value,
            dcf_per_share: valuation.per_share_value,
            market_cap: snapshot.market_cap.unwrap_or(0.0),
            current_price: snapshot.current_price.unwrap_or(0.0),
            upside_percent: upside_percent(valuation.per_share_value, snapshot.current_price),
            shares_outstanding: snapshot.shares_outstanding.unwrap_or(0.0),
            initial_cash_flow: base_cash_flow,
            initial_cash_flow_100m: base_cash_flow / HUNDRED_MILLION,
            cash_flow_source: source,
            future_cash_flows: valuation.cash_flows(),
            present_values: valuation.present_values(),
            terminal_value: valuation.terminal_value_pv,
            terminal_value_undiscounted: valuation.terminal_value,
            projected_values: ProjectedValues {
                year: valuation.years(),
                cash_flows: valuation.cash_flows(),
                present_values: valuation.present_values(),
            },
            valuation_metrics: ValuationMetrics {
                pe_ratio,
                pb_ratio,
                pe_percentile: percentiles.pe,
                pb_percentile: percentiles.pb,
                pe_historical_percentile: percentiles.pe,
                pb_historical_percentile: percentiles.pb,
                sector: snapshot.sector.clone(),
                industry_avg_pe: comparison.averages.avg_pe,
                industry_avg_pb: comparison.averages.avg_pb,
                peer_count: comparison.sampled.len(),
                futu_link: peer_link(&self.config.peer_link_base, ticker),
            },
        })
    }

    /// Percentile of the current multiples within the lookback window.
    /// Fetch failures are logged and reported as absent percentiles.
    async fn historical_percentiles(
        &self,
        snapshot: &CompanySnapshot,
        pe_ratio: Option<f64>,
        pb_ratio: Option<f64>,
    ) -> MultiplePercentiles {
        if pe_ratio.is_none() && pb_ratio.is_none() {
            return MultiplePercentiles::default();
        }

        let ticker = snapshot.ticker.as_str();
        let to = Utc::now().date_naive();
        let Some(from) = to.checked_sub_days(Days::new(365 * u64::from(self.config.history_years)))
        else {
            tracing::warn!(
                "Lookback of {} years is out of range, skipping historical multiples",
                self.config.history_years
            );
            return MultiplePercentiles::default();
        };

        let (bars, financials) = tokio::join!(
            self.provider.price_history(ticker, from, to),
            self.provider.quarterly_financials(ticker),
        );

        let (bars, financials) = match (bars, financials) {
            (Ok(bars), Ok(financials)) => (bars, financials),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Historical multiples unavailable for {}: {}", ticker, e);
                return MultiplePercentiles::default();
            }
        };
        if bars.is_empty() {
            tracing::warn!("No price history for {} since {}", ticker, from);
            return MultiplePercentiles::default();
        }

        MultipleHistory::from_financials(&bars, &financials, snapshot.shares_outstanding, from, to)
            .percentiles(pe_ratio, pb_ratio)
    }
}
