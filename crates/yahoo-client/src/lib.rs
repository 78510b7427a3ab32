use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use reqwest::{header::REFERER, Client, StatusCode};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use valuation_core::{
    Bar, CashFlowStatement, CompanySnapshot, FinancialDataProvider, QuarterlyFinancials,
    ValuationError, CAPITAL_EXPENDITURE, FREE_CASH_FLOW, NET_INCOME, OPERATING_CASH_FLOW,
    TOTAL_STOCKHOLDER_EQUITY,
};

mod auth;
pub mod parse;

use auth::CrumbManager;

const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";
const SUMMARY_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,assetProfile,financialData";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
/// Start of the fundamentals window; Yahoo rejects an open-ended range.
const TIMESERIES_PERIOD1: i64 = 493_590_046;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let Some(&oldest) = ts.front() else {
                continue;
            };
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Yahoo slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Yahoo Finance client for the data a valuation needs: company summary,
/// daily price history and statement time series.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    rate_limiter: RateLimiter,
    crumbs: Arc<CrumbManager>,
}

impl YahooClient {
    /// `rate_limit` is the maximum number of data requests per minute.
    pub fn new(rate_limit: usize) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
            crumbs: Arc::new(CrumbManager::default()),
        }
    }

    /// GET a JSON document. Authenticated calls carry the session crumb and are
    /// re-issued once with a fresh crumb if Yahoo rejects the session.
    async fn get_json(
        &self,
        ticker: &str,
        url: &str,
        query: &[(&str, String)],
        authenticated: bool,
    ) -> Result<serde_json::Value, ValuationError> {
        let attempts = if authenticated { 2 } else { 1 };

        for attempt in 0..attempts {
            let mut params: Vec<(&str, String)> = query.to_vec();
            if authenticated {
                params.push(("crumb", self.crumbs.crumb(&self.client).await?));
            }

            self.rate_limiter.acquire().await;
            let response = self
                .client
                .get(url)
                .header(REFERER, "https://finance.yahoo.com/")
                .query(&params)
                .send()
                .await
                .map_err(|e| ValuationError::UpstreamFailure(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(ValuationError::NotFound(ticker.to_string()));
            }
            if authenticated
                && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
                && attempt + 1 < attempts
            {
                tracing::warn!("Yahoo rejected session (HTTP {}), refreshing crumb", status);
                self.crumbs.invalidate().await;
                continue;
            }
            if !status.is_success() {
                return Err(ValuationError::UpstreamFailure(format!(
                    "HTTP {}: {}",
                    status,
                    response.text().await.unwrap_or_default()
                )));
            }

            return response
                .json()
                .await
                .map_err(|e| ValuationError::UpstreamFailure(e.to_string()));
        }

        Err(ValuationError::UpstreamFailure(
            "Yahoo session could not be authenticated".to_string(),
        ))
    }

    /// Fetch the named fundamentals series, mapped to statement labels.
    async fn get_timeseries(
        &self,
        ticker: &str,
        types: &[(&str, &str)],
    ) -> Result<Vec<(String, Vec<valuation_core::PeriodValue>)>, ValuationError> {
        let url = format!("{}/{}", TIMESERIES_URL, ticker);
        let type_list = types.iter().map(|(t, _)| *t).collect::<Vec<_>>().join(",");

        let json = self
            .get_json(
                ticker,
                &url,
                &[
                    ("symbol", ticker.to_string()),
                    ("type", type_list),
                    ("period1", TIMESERIES_PERIOD1.to_string()),
                    ("period2", Utc::now().timestamp().to_string()),
                ],
                false,
            )
            .await?;

        let mut series = parse::parse_timeseries(&json)?;
        Ok(types
            .iter()
            .map(|(yahoo_type, label)| {
                (label.to_string(), series.remove(*yahoo_type).unwrap_or_default())
            })
            .collect())
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new(120)
    }
}

#[async_trait]
impl FinancialDataProvider for YahooClient {
    async fn company_snapshot(&self, ticker: &str) -> Result<CompanySnapshot, ValuationError> {
        let url = format!("{}/{}", QUOTE_SUMMARY_URL, ticker);
        let json = self
            .get_json(ticker, &url, &[("modules", SUMMARY_MODULES.to_string())], true)
            .await?;
        parse::parse_quote_summary(ticker, &json)
    }

    async fn price_history(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ValuationError> {
        let period1 = from.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (to + ChronoDuration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let url = format!("{}/{}", CHART_URL, ticker);

        let json = self
            .get_json(
                ticker,
                &url,
                &[
                    ("period1", period1.to_string()),
                    ("period2", period2.to_string()),
                    ("interval", "1d".to_string()),
                ],
                false,
            )
            .await?;

        let bars = parse::parse_chart(ticker, &json)?;
        tracing::debug!("Fetched {} daily bars for {}", bars.len(), ticker);
        Ok(bars)
    }

    async fn cash_flow_statement(&self, ticker: &str) -> Result<CashFlowStatement, ValuationError> {
        let rows = self
            .get_timeseries(
                ticker,
                &[
                    ("annualFreeCashFlow", FREE_CASH_FLOW),
                    ("annualOperatingCashFlow", OPERATING_CASH_FLOW),
                    ("annualCapitalExpenditure", CAPITAL_EXPENDITURE),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .fold(CashFlowStatement::default(), |statement, (label, values)| {
                statement.with_row(&label, values)
            }))
    }

    async fn quarterly_financials(&self, ticker: &str) -> Result<QuarterlyFinancials, ValuationError> {
        let mut rows = self
            .get_timeseries(
                ticker,
                &[
                    ("quarterlyNetIncome", NET_INCOME),
                    ("quarterlyStockholdersEquity", TOTAL_STOCKHOLDER_EQUITY),
                ],
            )
            .await?
            .into_iter();

        let net_income = rows.next().map(|(_, v)| v).unwrap_or_default();
        let stockholders_equity = rows.next().map(|(_, v)| v).unwrap_or_default();
        let financials = QuarterlyFinancials {
            net_income,
            stockholders_equity,
        };

        if financials.is_empty() {
            return Err(ValuationError::NoFinancialData);
        }
        Ok(financials)
    }
}
