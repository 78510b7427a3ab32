use std::env;
use std::str::FromStr;

use sector_peers::SP500_CONSTITUENTS_URL;
use valuation_orchestrator::{OrchestratorConfig, DEFAULT_HISTORY_YEARS, DEFAULT_PEER_LINK_BASE};

/// Longest accepted `HISTORY_YEARS`.
pub const MAX_HISTORY_YEARS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else is pretty output.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) if !v.is_empty() && v != "pretty" => {
                tracing::warn!("Unknown LOG_FORMAT '{}', using pretty", v);
                LogFormat::Pretty
            }
            _ => LogFormat::Pretty,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(env::var("LOG_FORMAT").ok().as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Provider requests per minute.
    pub yahoo_rate_limit: usize,
    pub peer_sample_cap: usize,
    pub history_years: u32,
    pub constituents_url: String,
    pub peer_link_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            yahoo_rate_limit: 120,
            peer_sample_cap: sector_peers::DEFAULT_PEER_SAMPLE_CAP,
            history_years: DEFAULT_HISTORY_YEARS,
            constituents_url: SP500_CONSTITUENTS_URL.to_string(),
            peer_link_base: DEFAULT_PEER_LINK_BASE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys take the default; unparseable
    /// values are logged and also take the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Self {
            host: text("HOST", defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            yahoo_rate_limit: positive_or(&lookup, "YAHOO_RATE_LIMIT", defaults.yahoo_rate_limit),
            peer_sample_cap: parse_or(&lookup, "PEER_SAMPLE_CAP", defaults.peer_sample_cap),
            history_years: history_years(&lookup, defaults.history_years),
            constituents_url: text("SP500_CONSTITUENTS_URL", defaults.constituents_url),
            peer_link_base: text("PEER_LINK_BASE", defaults.peer_link_base),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            history_years: self.history_years,
            peer_sample_cap: self.peer_sample_cap,
            peer_link_base: self.peer_link_base.clone(),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}='{}', using default {}", key, raw, default);
            default
        }),
    }
}

fn positive_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + PartialOrd + Default + Copy,
{
    let value = parse_or(lookup, key, default);
    if value > T::default() {
        value
    } else {
        tracing::warn!("{} must be positive, using default {}", key, default);
        default
    }
}

fn history_years(lookup: &impl Fn(&str) -> Option<String>, default: u32) -> u32 {
    let years = positive_or(lookup, "HISTORY_YEARS", default);
    if years > MAX_HISTORY_YEARS {
        tracing::warn!("HISTORY_YEARS={} is above {}, capping", years, MAX_HISTORY_YEARS);
        return MAX_HISTORY_YEARS;
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:5000");
        assert_eq!(cfg.yahoo_rate_limit, 120);
        assert_eq!(cfg.peer_sample_cap, 20);
        assert_eq!(cfg.history_years, 10);
        assert_eq!(cfg.peer_link_base, "https://www.futunn.com/stock");
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("PEER_SAMPLE_CAP", "5"),
            ("HISTORY_YEARS", "3"),
        ]);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);

        let orchestrator = cfg.orchestrator_config();
        assert_eq!(orchestrator.peer_sample_cap, 5);
        assert_eq!(orchestrator.history_years, 3);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = config(&[
            ("PORT", "http"),
            ("YAHOO_RATE_LIMIT", "0"),
            ("HISTORY_YEARS", "-2"),
            ("HOST", "  "),
        ]);
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.yahoo_rate_limit, 120);
        assert_eq!(cfg.history_years, 10);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(LogFormat::parse(Some("xml")), LogFormat::Pretty);
    }

    #[test]
    fn test_history_years_is_capped() {
        let cfg = config(&[("HISTORY_YEARS", "4000000000")]);
        assert_eq!(cfg.history_years, MAX_HISTORY_YEARS);
        assert_eq!(config(&[("HISTORY_YEARS", "50")]).history_years, 50);
    }
}
