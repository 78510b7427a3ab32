//! Sector peer universe and peer-average valuation multiples.

pub mod aggregator;
pub mod sectors;
pub mod universe;

pub use aggregator::{
    fold_peer_multiples, PeerAggregator, PeerAverages, PeerMultiples, SectorComparison,
    DEFAULT_PEER_SAMPLE_CAP,
};
pub use sectors::{normalize_sector, same_sector};
pub use universe::{
    parse_constituents_table, Constituent, SectorUniverse, StaticUniverse, WikipediaSp500Universe,
    SP500_CONSTITUENTS_URL,
};
