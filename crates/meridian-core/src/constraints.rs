use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MeridianError;
use crate::types::Weight;
use crate::MeridianResult;

fn default_max_weight() -> Weight {
    dec!(0.25)
}

/// User-facing diversification rules: one cap for every asset plus
/// per-asset cap and floor overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversificationCaps {
    #[serde(default = "default_max_weight")]
    pub max_weight: Weight,
    #[serde(default)]
    pub overrides: BTreeMap<String, Weight>,
    #[serde(default)]
    pub floors: BTreeMap<String, Weight>,
}

impl Default for DiversificationCaps {
    fn default() -> Self {
        Self {
            max_weight: default_max_weight(),
            overrides: BTreeMap::new(),
            floors: BTreeMap::new(),
        }
    }
}

impl DiversificationCaps {
    pub fn uniform(max_weight: Weight) -> Self {
        Self {
            max_weight,
            ..Self::default()
        }
    }
}

/// Per-asset [lower, upper] bounds plus the implicit full-investment
/// equality (weights sum to 1). Only produced by [`ConstraintBuilder`], so
/// every instance is feasible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintSet {
    tickers: Vec<String>,
    lower: Vec<Weight>,
    upper: Vec<Weight>,
}

impl ConstraintSet {
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn lower(&self) -> &[Weight] {
        &self.lower
    }

    pub fn upper(&self) -> &[Weight] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Bounds and budget hold within `tolerance`.
    pub fn admits(&self, weights: &[Weight], tolerance: Decimal) -> bool {
        if weights.len() != self.len() {
            return false;
        }
        let total: Decimal = weights.iter().sum();
        (total - Decimal::ONE).abs() <= tolerance
            && weights
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(w, (l, u))| *w >= *l - tolerance && *w <= *u + tolerance)
    }
}

/// Builds and validates a [`ConstraintSet`] before any optimisation runs.
#[derive(Debug, Clone)]
pub struct ConstraintBuilder {
    tickers: Vec<String>,
    max_weight: Weight,
    caps: BTreeMap<String, Weight>,
    floors: BTreeMap<String, Weight>,
}

impl ConstraintBuilder {
    pub fn new(tickers: &[String], max_weight: Weight) -> Self {
        Self {
            tickers: tickers.to_vec(),
            max_weight,
            caps: BTreeMap::new(),
            floors: BTreeMap::new(),
        }
    }

    pub fn from_caps(tickers: &[String], caps: &DiversificationCaps) -> Self {
        Self {
            tickers: tickers.to_vec(),
            max_weight: caps.max_weight,
            caps: caps.overrides.clone(),
            floors: caps.floors.clone(),
        }
    }

    pub fn with_cap(mut self, ticker: &str, cap: Weight) -> Self {
        self.caps.insert(ticker.to_string(), cap);
        self
    }

    pub fn with_floor(mut self, ticker: &str, floor: Weight) -> Self {
        self.floors.insert(ticker.to_string(), floor);
        self
    }

    pub fn build(self) -> MeridianResult<ConstraintSet> {
        if self.tickers.is_empty() {
            return Err(MeridianError::InvalidInput {
                field: "universe".into(),
                reason: "At least one asset required".into(),
            });
        }
        for ticker in self.caps.keys().chain(self.floors.keys()) {
            if !self.tickers.contains(ticker) {
                return Err(MeridianError::InvalidInput {
                    field: format!("caps[{}]", ticker),
                    reason: "Override names an asset outside the universe".into(),
                });
            }
        }

        let mut lower = Vec::with_capacity(self.tickers.len());
        let mut upper = Vec::with_capacity(self.tickers.len());
        for ticker in &self.tickers {
            let lo = self.floors.get(ticker).copied().unwrap_or(Decimal::ZERO);
            let up = self.caps.get(ticker).copied().unwrap_or(self.max_weight);
            if lo < Decimal::ZERO || up > Decimal::ONE || lo > up {
                return Err(MeridianError::InvalidInput {
                    field: format!("caps[{}]", ticker),
                    reason: format!("Bounds must satisfy 0 <= lower <= upper <= 1, got [{}, {}]", lo, up),
                });
            }
            lower.push(lo);
            upper.push(up);
        }

        let upper_total: Decimal = upper.iter().sum();
        if upper_total < Decimal::ONE {
            return Err(MeridianError::InfeasibleConstraint {
                reason: format!(
                    "Upper bounds of {} assets sum to {}, below full investment",
                    self.tickers.len(),
                    upper_total
                ),
                shortfall: Decimal::ONE - upper_total,
            });
        }
        let lower_total: Decimal = lower.iter().sum();
        if lower_total > Decimal::ONE {
            return Err(MeridianError::InfeasibleConstraint {
                reason: format!("Lower bounds sum to {}, above full investment", lower_total),
                shortfall: lower_total - Decimal::ONE,
            });
        }

        Ok(ConstraintSet {
            tickers: self.tickers,
            lower,
            upper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tickers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{}", i)).collect()
    }

    #[test]
    fn test_default_bounds() {
        let set = ConstraintBuilder::new(&tickers(5), dec!(0.25)).build().unwrap();
        assert_eq!(set.lower(), &[Decimal::ZERO; 5]);
        assert_eq!(set.upper(), &[dec!(0.25); 5]);
    }

    #[test]
    fn test_two_assets_quarter_cap_infeasible() {
        match ConstraintBuilder::new(&tickers(2), dec!(0.25)).build() {
            Err(MeridianError::InfeasibleConstraint { shortfall, .. }) => {
                assert_eq!(shortfall, dec!(0.5));
            }
            other => panic!("Expected InfeasibleConstraint, got {:?}", other),
        }
    }

    #[test]
    fn test_override_can_restore_feasibility() {
        let set = ConstraintBuilder::new(&tickers(2), dec!(0.25))
            .with_cap("T0", dec!(0.8))
            .build()
            .unwrap();
        assert_eq!(set.upper(), &[dec!(0.8), dec!(0.25)]);
    }

    #[test]
    fn test_floors_exceeding_budget_infeasible() {
        let result = ConstraintBuilder::new(&tickers(2), dec!(1))
            .with_floor("T0", dec!(0.7))
            .with_floor("T1", dec!(0.5))
            .build();
        assert!(matches!(
            result,
            Err(MeridianError::InfeasibleConstraint { shortfall, .. }) if shortfall == dec!(0.2)
        ));
    }

    #[test]
    fn test_bound_out_of_range_rejected() {
        let result = ConstraintBuilder::new(&tickers(3), dec!(0.5))
            .with_cap("T1", dec!(1.2))
            .build();
        assert!(matches!(result, Err(MeridianError::InvalidInput { .. })));
    }

    #[test]
    fn test_unknown_override_rejected() {
        let result = ConstraintBuilder::new(&tickers(3), dec!(0.5))
            .with_cap("XYZ", dec!(0.2))
            .build();
        assert!(matches!(result, Err(MeridianError::InvalidInput { .. })));
    }

    #[test]
    fn test_admits() {
        let set = ConstraintBuilder::new(&tickers(4), dec!(0.4)).build().unwrap();
        assert!(set.admits(&[dec!(0.4), dec!(0.3), dec!(0.2), dec!(0.1)], dec!(0.000001)));
        assert!(!set.admits(&[dec!(0.5), dec!(0.3), dec!(0.2), dec!(0)], dec!(0.000001)));
    }
}
