//! Historical P/E and P/B reconstruction from quarterly statements and daily closes.
//!
//! Shares outstanding is the current figure applied to every past quarter.

use chrono::NaiveDate;
use serde::Serialize;
use valuation_core::stats::percentile_below;
use valuation_core::{Bar, PeriodValue, QuarterlyFinancials};

/// Close of the trading day nearest to `date`. `bars` must be date ordered.
/// Equidistant days resolve to the later one.
pub fn nearest_close(bars: &[Bar], date: NaiveDate) -> Option<f64> {
    let idx = bars.partition_point(|b| b.date() < date);
    let after = bars.get(idx);
    let before = idx.checked_sub(1).and_then(|i| bars.get(i));

    let bar = match (before, after) {
        (Some(b), Some(a)) => {
            if (date - b.date()) < (a.date() - date) {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    Some(bar.close)
}

/// `price * shares / (quarterly net income * 4)` per quarter with positive earnings.
pub fn historical_pe_samples(bars: &[Bar], net_income: &[PeriodValue], shares: f64) -> Vec<f64> {
    if !(shares.is_finite() && shares > 0.0) {
        return Vec::new();
    }
    net_income
        .iter()
        .filter_map(|period| {
            let annualized = period.value * 4.0;
            if annualized <= 0.0 {
                return None;
            }
            let price = nearest_close(bars, period.period_end)?;
            Some(price * shares / annualized)
        })
        .filter(|pe| pe.is_finite())
        .collect()
}

/// `price / (equity / shares)` per quarter with positive book value per share.
pub fn historical_pb_samples(bars: &[Bar], equity: &[PeriodValue], shares: f64) -> Vec<f64> {
    if !(shares.is_finite() && shares > 0.0) {
        return Vec::new();
    }
    equity
        .iter()
        .filter_map(|period| {
            let book_per_share = period.value / shares;
            if book_per_share <= 0.0 {
                return None;
            }
            let price = nearest_close(bars, period.period_end)?;
            Some(price / book_per_share)
        })
        .filter(|pb| pb.is_finite())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MultiplePercentiles {
    pub pe: Option<f64>,
    pub pb: Option<f64>,
}

/// Past valuation multiples of one company.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MultipleHistory {
    pub pe_samples: Vec<f64>,
    pub pb_samples: Vec<f64>,
}

/// Periods ending inside `[from, to]`.
fn within(periods: &[PeriodValue], from: NaiveDate, to: NaiveDate) -> Vec<PeriodValue> {
    periods
        .iter()
        .filter(|p| p.period_end >= from && p.period_end <= to)
        .copied()
        .collect()
}

impl MultipleHistory {
    /// Samples for the quarters ending between `from` and `to`. Quarters outside
    /// the window are ignored even when `bars` would price them.
    pub fn from_financials(
        bars: &[Bar],
        financials: &QuarterlyFinancials,
        shares_outstanding: Option<f64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Self {
        let Some(shares) = shares_outstanding else {
            return Self::default();
        };
        let net_income = within(&financials.net_income, from, to);
        let equity = within(&financials.stockholders_equity, from, to);
        let history = Self {
            pe_samples: historical_pe_samples(bars, &net_income, shares),
            pb_samples: historical_pb_samples(bars, &equity, shares),
        };
        tracing::debug!(
            "Historical multiples: {} P/E samples, {} P/B samples",
            history.pe_samples.len(),
            history.pb_samples.len()
        );
        history
    }

    /// Rank of the current multiples against their own history.
    pub fn percentiles(&self, current_pe: Option<f64>, current_pb: Option<f64>) -> MultiplePercentiles {
        MultiplePercentiles {
            pe: current_pe.and_then(|pe| percentile_below(&self.pe_samples, pe)),
            pb: current_pb.and_then(|pb| percentile_below(&self.pb_samples, pb)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(date: NaiveDate, close: f64) -> Bar {
        Bar {
            timestamp: Utc.from_utc_datetime(&date.and_hms_opt(14, 30, 0).unwrap()),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    fn bars() -> Vec<Bar> {
        vec![
            bar(d(2023, 3, 29), 10.0),
            bar(d(2023, 3, 30), 11.0),
            bar(d(2023, 4, 3), 12.0),
            bar(d(2023, 6, 30), 20.0),
        ]
    }

    #[test]
    fn test_nearest_close() {
        let bars = bars();
        assert_eq!(nearest_close(&bars, d(2023, 3, 30)), Some(11.0));
        // Mar 31 is one day from Mar 30 and three from Apr 3
        assert_eq!(nearest_close(&bars, d(2023, 3, 31)), Some(11.0));
        assert_eq!(nearest_close(&bars, d(2023, 4, 2)), Some(12.0));
        assert_eq!(nearest_close(&bars, d(2020, 1, 1)), Some(10.0));
        assert_eq!(nearest_close(&bars, d(2024, 1, 1)), Some(20.0));
        assert_eq!(nearest_close(&[], d(2024, 1, 1)), None);
    }

    #[test]
    fn test_nearest_close_tie_takes_later_day() {
        let bars = vec![bar(d(2023, 1, 1), 1.0), bar(d(2023, 1, 3), 3.0)];
        assert_eq!(nearest_close(&bars, d(2023, 1, 2)), Some(3.0));
    }

    #[test]
    fn test_pe_samples_skip_losses() {
        let net_income = vec![
            PeriodValue::new(d(2023, 3, 31), 25.0),
            PeriodValue::new(d(2023, 6, 30), -5.0),
            PeriodValue::new(d(2023, 6, 30), 0.0),
        ];
        // 11 * 100 / (25 * 4)
        let samples = historical_pe_samples(&bars(), &net_income, 100.0);
        assert_eq!(samples, vec![11.0]);
    }

    #[test]
    fn test_pb_samples_skip_negative_equity() {
        let equity = vec![
            PeriodValue::new(d(2023, 3, 31), 550.0),
            PeriodValue::new(d(2023, 6, 30), -10.0),
            PeriodValue::new(d(2023, 6, 30), 1000.0),
        ];
        // 11 / (550 / 100), 20 / (1000 / 100)
        let samples = historical_pb_samples(&bars(), &equity, 100.0);
        assert_eq!(samples, vec![2.0, 2.0]);
    }

    #[test]
    fn test_no_shares_no_samples() {
        let financials = QuarterlyFinancials {
            net_income: vec![PeriodValue::new(d(2023, 3, 31), 25.0)],
            stockholders_equity: vec![PeriodValue::new(d(2023, 3, 31), 550.0)],
        };
        assert_eq!(
            MultipleHistory::from_financials(&bars(), &financials, None, d(2023, 1, 1), d(2023, 12, 31)),
            MultipleHistory::default()
        );
        assert!(historical_pe_samples(&bars(), &financials.net_income, 0.0).is_empty());
    }

    #[test]
    fn test_quarters_outside_window_are_ignored() {
        let financials = QuarterlyFinancials {
            net_income: vec![
                PeriodValue::new(d(1995, 3, 31), 250.0),
                PeriodValue::new(d(2023, 3, 31), 25.0),
            ],
            stockholders_equity: vec![
                PeriodValue::new(d(1995, 3, 31), 100.0),
                PeriodValue::new(d(2023, 6, 30), 1000.0),
            ],
        };
        let history = MultipleHistory::from_financials(
            &bars(),
            &financials,
            Some(100.0),
            d(2023, 3, 29),
            d(2023, 6, 30),
        );
        // 11 * 100 / (25 * 4); the 1995 quarter would otherwise be priced at 10
        assert_eq!(history.pe_samples, vec![11.0]);
        assert_eq!(history.pb_samples, vec![2.0]);
    }

    #[test]
    fn test_percentiles() {
        let history = MultipleHistory {
            pe_samples: vec![10.0, 12.0, 15.0, 20.0],
            pb_samples: vec![],
        };
        let pct = history.percentiles(Some(14.0), Some(3.0));
        assert_eq!(pct.pe, Some(50.0));
        assert_eq!(pct.pb, None);
        assert_eq!(history.percentiles(None, None), MultiplePercentiles::default());
        assert_eq!(history.percentiles(Some(1.0), None).pe, Some(0.0));
        assert_eq!(history.percentiles(Some(99.0), None).pe, Some(100.0));
    }
}
