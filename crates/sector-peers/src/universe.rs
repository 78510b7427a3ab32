use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use valuation_core::ValuationError;

pub const SP500_CONSTITUENTS_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

/// A company in the reference universe with its GICS sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: String,
}

impl Constituent {
    pub fn new(symbol: &str, sector: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: None,
            sector: sector.to_string(),
        }
    }
}

/// Reference table of sector-classified companies.
#[async_trait]
pub trait SectorUniverse: Send + Sync {
    /// All constituents in table order.
    async fn constituents(&self) -> Result<Vec<Constituent>, ValuationError>;
}

/// Fixed, in-process universe.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    constituents: Vec<Constituent>,
}

impl StaticUniverse {
    pub fn new(constituents: Vec<Constituent>) -> Self {
        Self { constituents }
    }
}

#[async_trait]
impl SectorUniverse for StaticUniverse {
    async fn constituents(&self) -> Result<Vec<Constituent>, ValuationError> {
        Ok(self.constituents.clone())
    }
}

/// S&P 500 constituents scraped from the Wikipedia list page on every call.
#[derive(Clone)]
pub struct WikipediaSp500Universe {
    client: Client,
    url: String,
}

impl WikipediaSp500Universe {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent("fairvalue/0.1 (sector peer lookup)")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
        }
    }
}

impl Default for WikipediaSp500Universe {
    fn default() -> Self {
        Self::new(SP500_CONSTITUENTS_URL)
    }
}

#[async_trait]
impl SectorUniverse for WikipediaSp500Universe {
    async fn constituents(&self) -> Result<Vec<Constituent>, ValuationError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ValuationError::UpstreamFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValuationError::UpstreamFailure(format!(
                "Constituents page returned HTTP {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ValuationError::UpstreamFailure(e.to_string()))?;

        let constituents = parse_constituents_table(&html)?;
        tracing::debug!("Loaded {} constituents from {}", constituents.len(), self.url);
        Ok(constituents)
    }
}

fn selector(css: &str) -> Result<Selector, ValuationError> {
    Selector::parse(css)
        .map_err(|e| ValuationError::UpstreamFailure(format!("Invalid CSS selector {css}: {e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Provider tickers use `-` for share classes (`BRK.B` is `BRK-B`).
fn provider_symbol(symbol: &str) -> String {
    symbol.trim().replace('.', "-").to_uppercase()
}

/// Parse the constituents table out of the list page.
///
/// Columns are located by header text (`Symbol`, `Security`, `GICS Sector`), so
/// column reordering on the page does not break the scrape.
pub fn parse_constituents_table(html: &str) -> Result<Vec<Constituent>, ValuationError> {
    let document = Html::parse_document(html);
    let by_id = selector("table#constituents")?;
    let any_wikitable = selector("table.wikitable")?;
    let row_sel = selector("tr")?;
    let header_sel = selector("th")?;
    let cell_sel = selector("td")?;

    let table = document
        .select(&by_id)
        .next()
        .or_else(|| document.select(&any_wikitable).next())
        .ok_or_else(|| ValuationError::UpstreamFailure("Constituents table not found".into()))?;

    let mut rows = table.select(&row_sel);
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.select(&header_sel).map(cell_text).collect())
        .unwrap_or_default();

    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(symbol_idx), Some(sector_idx)) = (column("Symbol"), column("GICS Sector")) else {
        return Err(ValuationError::UpstreamFailure(
            "Constituents table is missing Symbol or GICS Sector columns".into(),
        ));
    };
    let name_idx = column("Security");

    let constituents = rows
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
            let symbol = cells.get(symbol_idx).filter(|s| !s.is_empty())?;
            let sector = cells.get(sector_idx).filter(|s| !s.is_empty())?;
            Some(Constituent {
                symbol: provider_symbol(symbol),
                name: name_idx.and_then(|i| cells.get(i).cloned()),
                sector: sector.clone(),
            })
        })
        .collect();

    Ok(constituents)
}
