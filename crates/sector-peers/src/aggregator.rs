use serde::Serialize;
use std::sync::Arc;
use valuation_core::stats::{mean, positive_finite};
use valuation_core::{FinancialDataProvider, ValuationError};

use crate::sectors::{normalize_sector, same_sector};
use crate::universe::SectorUniverse;

/// Peers sampled per valuation. The list is truncated in table order, not randomised.
pub const DEFAULT_PEER_SAMPLE_CAP: usize = 20;

/// Multiples reported for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PeerMultiples {
    pub trailing_pe: Option<f64>,
    pub price_to_book: Option<f64>,
}

/// Mean of the usable peer multiples and how many values went into each.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PeerAverages {
    pub avg_pe: Option<f64>,
    pub avg_pb: Option<f64>,
    pub pe_count: usize,
    pub pb_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SectorComparison {
    /// GICS sector the peers were drawn from.
    pub sector: Option<String>,
    pub peers: Vec<String>,
    pub sampled: Vec<String>,
    pub averages: PeerAverages,
}

/// Average the successful peer lookups, keeping only positive finite multiples.
/// Failed lookups contribute nothing.
pub fn fold_peer_multiples(
    outcomes: &[(String, Result<PeerMultiples, ValuationError>)],
) -> PeerAverages {
    let successes: Vec<&PeerMultiples> = outcomes
        .iter()
        .filter_map(|(_, outcome)| outcome.as_ref().ok())
        .collect();

    let pe = positive_finite(successes.iter().filter_map(|m| m.trailing_pe));
    let pb = positive_finite(successes.iter().filter_map(|m| m.price_to_book));

    PeerAverages {
        avg_pe: mean(&pe),
        avg_pb: mean(&pb),
        pe_count: pe.len(),
        pb_count: pb.len(),
    }
}

pub struct PeerAggregator {
    provider: Arc<dyn FinancialDataProvider>,
    universe: Arc<dyn SectorUniverse>,
    sample_cap: usize,
}

impl PeerAggregator {
    pub fn new(provider: Arc<dyn FinancialDataProvider>, universe: Arc<dyn SectorUniverse>) -> Self {
        Self {
            provider,
            universe,
            sample_cap: DEFAULT_PEER_SAMPLE_CAP,
        }
    }

    pub fn with_sample_cap(mut self, sample_cap: usize) -> Self {
        self.sample_cap = sample_cap;
        self
    }

    /// Tickers in `sector`, in reference-table order, without `exclude`.
    pub async fn peers_for_sector(
        &self,
        sector: &str,
        exclude: &str,
    ) -> Result<Vec<String>, ValuationError> {
        let constituents = self.universe.constituents().await?;
        let mut peers: Vec<String> = Vec::new();
        for constituent in constituents {
            if !same_sector(&constituent.sector, sector)
                || constituent.symbol.eq_ignore_ascii_case(exclude)
                || peers.contains(&constituent.symbol)
            {
                continue;
            }
            peers.push(constituent.symbol);
        }
        Ok(peers)
    }

    /// Look up multiples for the first `sample_cap` tickers, one at a time.
    pub async fn collect_peer_multiples(
        &self,
        tickers: &[String],
    ) -> Vec<(String, Result<PeerMultiples, ValuationError>)> {
        let mut outcomes = Vec::with_capacity(tickers.len().min(self.sample_cap));
        for ticker in tickers.iter().take(self.sample_cap) {
            let outcome = self
                .provider
                .company_snapshot(ticker)
                .await
                .map(|snap| PeerMultiples {
                    trailing_pe: snap.trailing_pe,
                    price_to_book: snap.price_to_book,
                });
            if let Err(e) = &outcome {
                tracing::debug!("Skipping peer {}: {}", ticker, e);
            }
            outcomes.push((ticker.clone(), outcome));
        }
        outcomes
    }

    /// Sector peers of `ticker` and their average multiples. Never fails: a
    /// missing sector or an unreachable reference table yields an empty comparison.
    pub async fn compare(&self, ticker: &str, sector: Option<&str>) -> SectorComparison {
        let Some(sector) = sector.filter(|s| !s.trim().is_empty()) else {
            return SectorComparison::default();
        };

        let peers = match self.peers_for_sector(sector, ticker).await {
            Ok(peers) => peers,
            Err(e) => {
                tracing::warn!("Could not load sector peers for {}: {}", ticker, e);
                return SectorComparison {
                    sector: Some(normalize_sector(sector)),
                    ..Default::default()
                };
            }
        };

        let outcomes = self.collect_peer_multiples(&peers).await;
        let averages = fold_peer_multiples(&outcomes);
        tracing::info!(
            "Sector {} for {}: {} peers, sampled {}, P/E from {}, P/B from {}",
            sector,
            ticker,
            peers.len(),
            outcomes.len(),
            averages.pe_count,
            averages.pb_count
        );

        SectorComparison {
            sector: Some(normalize_sector(sector)),
            sampled: outcomes.into_iter().map(|(t, _)| t).collect(),
            peers,
            averages,
        }
    }
}
