//! Sector label normalisation.
//!
//! The data provider classifies companies with its own sector names while the
//! constituents table uses GICS sectors. Both are mapped to GICS before comparing.

const PROVIDER_TO_GICS: &[(&str, &str)] = &[
    ("technology", "Information Technology"),
    ("healthcare", "Health Care"),
    ("financial services", "Financials"),
    ("consumer cyclical", "Consumer Discretionary"),
    ("consumer defensive", "Consumer Staples"),
    ("basic materials", "Materials"),
    ("communication services", "Communication Services"),
    ("industrials", "Industrials"),
    ("energy", "Energy"),
    ("utilities", "Utilities"),
    ("real estate", "Real Estate"),
];

/// GICS name for a provider or GICS sector label. Unknown labels pass through trimmed.
pub fn normalize_sector(label: &str) -> String {
    let trimmed = label.trim();
    let lower = trimmed.to_lowercase();
    PROVIDER_TO_GICS
        .iter()
        .find(|(provider, _)| *provider == lower)
        .map(|(_, gics)| gics.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Case-insensitive comparison after normalisation.
pub fn same_sector(a: &str, b: &str) -> bool {
    normalize_sector(a).eq_ignore_ascii_case(&normalize_sector(b))
}
