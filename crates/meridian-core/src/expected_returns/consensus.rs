use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MeridianError;
use crate::types::{Asset, Rate};
use crate::MeridianResult;

const BLEND_TOLERANCE: Decimal = dec!(0.000000001);

/// Forward-looking assumption for one asset class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassAssumption {
    pub expected_return: Rate,
    pub expected_volatility: Rate,
}

/// Share of a composite asset exposed to one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassExposure {
    pub asset_class: String,
    pub weight: Decimal,
}

/// Static capital market assumption table, keyed by asset class.
///
/// Composite assets (multi-asset funds) are declared once with fixed class
/// exposures; their expected return is the exposure-weighted blend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusTable {
    pub assumptions: BTreeMap<String, ClassAssumption>,
    #[serde(default)]
    pub composites: BTreeMap<String, Vec<ClassExposure>>,
}

impl ConsensusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, asset_class: &str, expected_return: Rate, expected_volatility: Rate) -> Self {
        self.assumptions.insert(
            asset_class.to_string(),
            ClassAssumption {
                expected_return,
                expected_volatility,
            },
        );
        self
    }

    /// Declare a composite asset. Exposures must be non-negative and sum to 1.
    pub fn with_composite(mut self, ticker: &str, exposures: Vec<ClassExposure>) -> MeridianResult<Self> {
        validate_exposures(ticker, &exposures)?;
        self.composites.insert(ticker.to_string(), exposures);
        Ok(self)
    }

    /// Long-term arithmetic return assumptions (USD, 2026 vintage) for the
    /// eight classes of the default multi-asset universe.
    pub fn long_term_defaults() -> Self {
        Self::new()
            .with_class("us_large_cap", dec!(0.0794), dec!(0.1600))
            .with_class("us_small_cap", dec!(0.0889), dec!(0.2100))
            .with_class("europe_equity", dec!(0.0743), dec!(0.1750))
            .with_class("emerging_markets_equity", dec!(0.0974), dec!(0.2050))
            .with_class("euro_government_bonds", dec!(0.0354), dec!(0.0450))
            .with_class("euro_high_yield", dec!(0.0572), dec!(0.0900))
            .with_class("global_reits", dec!(0.0895), dec!(0.1900))
            .with_class("gold", dec!(0.0678), dec!(0.1500))
    }

    pub fn validate(&self) -> MeridianResult<()> {
        for (class, a) in &self.assumptions {
            if a.expected_volatility < Decimal::ZERO {
                return Err(MeridianError::InvalidInput {
                    field: format!("assumptions[{}].expected_volatility", class),
                    reason: "Volatility cannot be negative".into(),
                });
            }
        }
        for (ticker, exposures) in &self.composites {
            validate_exposures(ticker, exposures)?;
        }
        Ok(())
    }

    pub fn assumption(&self, asset_class: &str) -> Option<&ClassAssumption> {
        self.assumptions.get(asset_class)
    }

    /// Expected return of one asset: a composite blend when declared,
    /// otherwise its own class assumption.
    pub fn expected_return(&self, asset: &Asset) -> MeridianResult<Rate> {
        if let Some(exposures) = self.composites.get(&asset.ticker) {
            let mut blended = Decimal::ZERO;
            for exposure in exposures {
                let a = self.lookup(&asset.ticker, &exposure.asset_class)?;
                blended += exposure.weight * a.expected_return;
            }
            return Ok(blended);
        }
        Ok(self.lookup(&asset.ticker, &asset.asset_class)?.expected_return)
    }

    fn lookup(&self, ticker: &str, asset_class: &str) -> MeridianResult<&ClassAssumption> {
        self.assumptions
            .get(asset_class)
            .ok_or_else(|| MeridianError::MissingAssetMapping {
                asset: ticker.to_string(),
                asset_class: asset_class.to_string(),
            })
    }
}

fn validate_exposures(ticker: &str, exposures: &[ClassExposure]) -> MeridianResult<()> {
    if exposures.is_empty() {
        return Err(MeridianError::InvalidInput {
            field: format!("composites[{}]", ticker),
            reason: "Composite needs at least one class exposure".into(),
        });
    }
    if let Some(neg) = exposures.iter().find(|e| e.weight < Decimal::ZERO) {
        return Err(MeridianError::InvalidInput {
            field: format!("composites[{}]", ticker),
            reason: format!("Negative exposure {} to {}", neg.weight, neg.asset_class),
        });
    }
    let total: Decimal = exposures.iter().map(|e| e.weight).sum();
    if (total - Decimal::ONE).abs() > BLEND_TOLERANCE {
        return Err(MeridianError::InvalidInput {
            field: format!("composites[{}]", ticker),
            reason: format!("Exposures sum to {}, expected 1", total),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exposure(class: &str, weight: Decimal) -> ClassExposure {
        ClassExposure {
            asset_class: class.into(),
            weight,
        }
    }

    #[test]
    fn test_plain_asset_uses_class_assumption() {
        let table = ConsensusTable::long_term_defaults();
        let gold = Asset::new("4GLD.DE", "gold", "Global");
        assert_eq!(table.expected_return(&gold).unwrap(), dec!(0.0678));
    }

    #[test]
    fn test_composite_blends_classes() {
        // 60/40 fund: 0.6 * 0.08 + 0.4 * 0.04 = 0.064
        let table = ConsensusTable::new()
            .with_class("equity", dec!(0.08), dec!(0.16))
            .with_class("bonds", dec!(0.04), dec!(0.05))
            .with_composite(
                "BAL",
                vec![exposure("equity", dec!(0.6)), exposure("bonds", dec!(0.4))],
            )
            .unwrap();
        let fund = Asset::new("BAL", "multi_asset", "Global");
        assert_eq!(table.expected_return(&fund).unwrap(), dec!(0.064));
    }

    #[test]
    fn test_missing_class_is_reported() {
        let table = ConsensusTable::long_term_defaults();
        let btc = Asset::new("BTC", "crypto", "Global");
        match table.expected_return(&btc) {
            Err(MeridianError::MissingAssetMapping { asset, asset_class }) => {
                assert_eq!(asset, "BTC");
                assert_eq!(asset_class, "crypto");
            }
            other => panic!("Expected MissingAssetMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_composite_with_unknown_class_is_reported() {
        let table = ConsensusTable::new()
            .with_class("equity", dec!(0.08), dec!(0.16))
            .with_composite(
                "BAL",
                vec![exposure("equity", dec!(0.5)), exposure("infra", dec!(0.5))],
            )
            .unwrap();
        let fund = Asset::new("BAL", "multi_asset", "Global");
        assert!(matches!(
            table.expected_return(&fund),
            Err(MeridianError::MissingAssetMapping { .. })
        ));
    }

    #[test]
    fn test_composite_weights_must_sum_to_one() {
        let result = ConsensusTable::new().with_composite(
            "BAL",
            vec![exposure("equity", dec!(0.6)), exposure("bonds", dec!(0.3))],
        );
        assert!(result.is_err());
    }
}
