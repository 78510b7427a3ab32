use serde::Serialize;
use valuation_core::ValuationError;

pub mod historical;

pub use historical::{
    historical_pb_samples, historical_pe_samples, nearest_close, MultipleHistory,
    MultiplePercentiles,
};

const MIN_YEARS: u32 = 1;
const MAX_YEARS: u32 = 50;
/// Upper bound for any rate, as a fraction (1000%).
const MAX_RATE: f64 = 10.0;

/// Range-checked projection inputs. Rates are fractions (`0.10` is 10%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DcfAssumptions {
    pub growth_rate: f64,
    pub discount_rate: f64,
    pub terminal_growth_rate: f64,
    pub years: u32,
}

impl DcfAssumptions {
    pub fn new(
        growth_rate: f64,
        discount_rate: f64,
        terminal_growth_rate: f64,
        years: u32,
    ) -> Result<Self, ValuationError> {
        let assumptions = Self {
            growth_rate,
            discount_rate,
            terminal_growth_rate,
            years,
        };
        assumptions.validate()?;
        Ok(assumptions)
    }

    /// Build from percentages as entered on the form (`10` means 10%).
    pub fn from_percentages(
        growth_pct: f64,
        discount_pct: f64,
        terminal_pct: f64,
        years: u32,
    ) -> Result<Self, ValuationError> {
        Self::new(
            growth_pct / 100.0,
            discount_pct / 100.0,
            terminal_pct / 100.0,
            years,
        )
    }

    pub fn validate(&self) -> Result<(), ValuationError> {
        check_rate("growth_rate", self.growth_rate, -1.0, true)?;
        check_rate("discount_rate", self.discount_rate, -1.0, false)?;
        check_rate("perpetual_growth_rate", self.terminal_growth_rate, -1.0, false)?;

        if !(MIN_YEARS..=MAX_YEARS).contains(&self.years) {
            return Err(ValuationError::InvalidInput(format!(
                "years must be between {} and {}, got {}",
                MIN_YEARS, MAX_YEARS, self.years
            )));
        }

        // Gordon growth diverges or flips sign otherwise
        if self.discount_rate <= self.terminal_growth_rate {
            return Err(ValuationError::InvalidTerminalAssumption {
                discount_rate: self.discount_rate,
                terminal_growth_rate: self.terminal_growth_rate,
            });
        }
        Ok(())
    }
}

fn check_rate(name: &str, value: f64, min: f64, min_inclusive: bool) -> Result<(), ValuationError> {
    let above_min = if min_inclusive { value >= min } else { value > min };
    if !value.is_finite() || !above_min || value > MAX_RATE {
        let open = if min_inclusive { "[" } else { "(" };
        return Err(ValuationError::InvalidInput(format!(
            "{} must be a number in {}{}%, {}%], got {}%",
            name,
            open,
            min * 100.0,
            MAX_RATE * 100.0,
            value * 100.0
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedPeriod {
    pub year: u32,
    pub cash_flow: f64,
    pub present_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DcfValuation {
    pub base_cash_flow: f64,
    pub projections: Vec<ProjectedPeriod>,
    /// Gordon growth value at the end of the horizon, undiscounted.
    pub terminal_value: f64,
    pub terminal_value_pv: f64,
    pub total_value: f64,
    /// Zero when shares outstanding is unknown or zero.
    pub per_share_value: f64,
}

impl DcfValuation {
    pub fn cash_flows(&self) -> Vec<f64> {
        self.projections.iter().map(|p| p.cash_flow).collect()
    }

    pub fn present_values(&self) -> Vec<f64> {
        self.projections.iter().map(|p| p.present_value).collect()
    }

    pub fn years(&self) -> Vec<u32> {
        self.projections.iter().map(|p| p.year).collect()
    }
}

/// `(intrinsic - price) / price * 100`; absent without a positive price.
pub fn upside_percent(per_share_value: f64, current_price: Option<f64>) -> Option<f64> {
    let price = current_price.filter(|p| p.is_finite() && *p > 0.0)?;
    Some((per_share_value - price) / price * 100.0)
}

/// Discounted cash flow valuation with a Gordon growth terminal value.
pub struct DcfEngine;

impl DcfEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(
        &self,
        base_cash_flow: f64,
        assumptions: &DcfAssumptions,
        shares_outstanding: Option<f64>,
    ) -> Result<DcfValuation, ValuationError> {
        assumptions.validate()?;
        if !base_cash_flow.is_finite() {
            return Err(ValuationError::InvalidInput(format!(
                "initial cash flow must be a finite number, got {}",
                base_cash_flow
            )));
        }

        let growth = 1.0 + assumptions.growth_rate;
        let discount = 1.0 + assumptions.discount_rate;

        let projections: Vec<ProjectedPeriod> = (1..=assumptions.years)
            .map(|year| {
                let cash_flow = base_cash_flow * growth.powi(year as i32);
                ProjectedPeriod {
                    year,
                    cash_flow,
                    present_value: cash_flow / discount.powi(year as i32),
                }
            })
            .collect();

        let final_cash_flow = projections.last().map(|p| p.cash_flow).unwrap_or(base_cash_flow);
        let terminal_value = self.terminal_value(final_cash_flow, assumptions);
        let terminal_value_pv = terminal_value / discount.powi(assumptions.years as i32);
        let total_value = projections.iter().map(|p| p.present_value).sum::<f64>() + terminal_value_pv;

        Ok(DcfValuation {
            base_cash_flow,
            projections,
            terminal_value,
            terminal_value_pv,
            total_value,
            per_share_value: self.per_share(total_value, shares_outstanding),
        })
    }

    fn terminal_value(&self, final_cash_flow: f64, assumptions: &DcfAssumptions) -> f64 {
        final_cash_flow * (1.0 + assumptions.terminal_growth_rate)
            / (assumptions.discount_rate - assumptions.terminal_growth_rate)
    }

    fn per_share(&self, total_value: f64, shares_outstanding: Option<f64>) -> f64 {
        match shares_outstanding {
            Some(shares) if shares.is_finite() && shares > 0.0 => total_value / shares,
            _ => 0.0,
        }
    }
}

impl Default for DcfEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_two_year_projection() {
        let assumptions = DcfAssumptions::new(0.10, 0.08, 0.02, 2).unwrap();
        let valuation = DcfEngine::new().compute(100.0, &assumptions, Some(10.0)).unwrap();

        assert_eq!(valuation.years(), vec![1, 2]);
        assert!(close(valuation.projections[0].cash_flow, 110.0));
        assert!(close(valuation.projections[1].cash_flow, 121.0));
        assert!(close(valuation.projections[0].present_value, 110.0 / 1.08));
        assert!(close(valuation.projections[1].present_value, 121.0 / 1.08_f64.powi(2)));
        assert!(close(valuation.terminal_value, 2057.0));
        assert!((valuation.terminal_value_pv - 1763.546).abs() < 1e-3);
        assert!((valuation.total_value - 1969.136).abs() < 1e-3);
        assert!(close(valuation.per_share_value, valuation.total_value / 10.0));
    }

    #[test]
    fn test_total_matches_closed_form() {
        let assumptions = DcfAssumptions::from_percentages(7.5, 11.0, 3.0, 8).unwrap();
        let base = 2_500_000_000.0;
        let valuation = DcfEngine::new().compute(base, &assumptions, None).unwrap();

        let explicit: f64 = (1..=8)
            .map(|i| base * 1.075_f64.powi(i) / 1.11_f64.powi(i))
            .sum();
        let relative = (valuation.total_value - (explicit + valuation.terminal_value_pv)).abs()
            / valuation.total_value;
        assert!(relative < 1e-12);
    }

    #[test]
    fn test_compute_is_pure() {
        let assumptions = DcfAssumptions::from_percentages(5.0, 9.0, 2.5, 5).unwrap();
        let engine = DcfEngine::default();
        let first = engine.compute(1234.5, &assumptions, Some(3.0)).unwrap();
        let second = engine.compute(1234.5, &assumptions, Some(3.0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_rates_rejected() {
        let err = DcfAssumptions::new(0.05, 0.05, 0.05, 5).unwrap_err();
        assert_eq!(
            err,
            ValuationError::InvalidTerminalAssumption {
                discount_rate: 0.05,
                terminal_growth_rate: 0.05
            }
        );

        let inverted = DcfAssumptions::from_percentages(5.0, 3.0, 4.0, 5).unwrap_err();
        assert!(matches!(inverted, ValuationError::InvalidTerminalAssumption { .. }));
    }

    #[test]
    fn test_unvalidated_assumptions_rejected_by_engine() {
        let assumptions = DcfAssumptions {
            growth_rate: 0.1,
            discount_rate: 0.02,
            terminal_growth_rate: 0.02,
            years: 5,
        };
        assert!(DcfEngine::new().compute(100.0, &assumptions, None).is_err());
    }

    #[test]
    fn test_range_checks() {
        assert!(DcfAssumptions::from_percentages(-100.0, 10.0, 2.0, 5).is_ok());
        assert!(DcfAssumptions::from_percentages(-101.0, 10.0, 2.0, 5).is_err());
        assert!(DcfAssumptions::from_percentages(1001.0, 10.0, 2.0, 5).is_err());
        assert!(DcfAssumptions::from_percentages(5.0, 10.0, -100.0, 5).is_err());
        assert!(DcfAssumptions::from_percentages(f64::NAN, 10.0, 2.0, 5).is_err());
        assert!(DcfAssumptions::from_percentages(5.0, 10.0, 2.0, 0).is_err());
        assert!(DcfAssumptions::from_percentages(5.0, 10.0, 2.0, 51).is_err());
        assert!(matches!(
            DcfAssumptions::from_percentages(5.0, f64::INFINITY, 2.0, 5).unwrap_err(),
            ValuationError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_per_share_without_shares_is_zero() {
        let assumptions = DcfAssumptions::from_percentages(5.0, 10.0, 2.0, 5).unwrap();
        let engine = DcfEngine::new();
        assert_eq!(engine.compute(100.0, &assumptions, None).unwrap().per_share_value, 0.0);
        assert_eq!(engine.compute(100.0, &assumptions, Some(0.0)).unwrap().per_share_value, 0.0);
    }

    #[test]
    fn test_non_finite_base_rejected() {
        let assumptions = DcfAssumptions::from_percentages(5.0, 10.0, 2.0, 5).unwrap();
        assert!(DcfEngine::new().compute(f64::NAN, &assumptions, None).is_err());
    }

    #[test]
    fn test_upside_percent() {
        assert_eq!(upside_percent(150.0, Some(100.0)), Some(50.0));
        assert_eq!(upside_percent(80.0, Some(100.0)), Some(-20.0));
        assert_eq!(upside_percent(80.0, Some(0.0)), None);
        assert_eq!(upside_percent(80.0, None), None);
    }
}
