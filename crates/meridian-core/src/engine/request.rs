use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::allocation::Preference;
use crate::constraints::DiversificationCaps;
use crate::error::MeridianError;
use crate::expected_returns::ReturnModel;
use crate::frontier::{SolverSettings, DEFAULT_FRONTIER_POINTS};
use crate::risk_model::CovarianceSettings;
use crate::types::{Asset, EstimationWindow, PriceSeries, Rate};
use crate::MeridianResult;

fn default_risk_free_rate() -> Rate {
    dec!(0.02)
}

fn default_frontier_points() -> usize {
    DEFAULT_FRONTIER_POINTS
}

/// Knobs shared by every optimisation, whatever the source of estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSettings {
    /// Used for Sharpe ratios only; CAPM carries its own rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    #[serde(default = "default_frontier_points")]
    pub frontier_points: usize,
    #[serde(default)]
    pub solver: SolverSettings,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            frontier_points: default_frontier_points(),
            solver: SolverSettings::default(),
        }
    }
}

/// One optimisation request against historical data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub universe: Vec<Asset>,
    #[serde(default)]
    pub preference: Preference,
    pub model: ReturnModel,
    #[serde(default)]
    pub caps: DiversificationCaps,
    pub window: EstimationWindow,
    #[serde(default)]
    pub covariance: CovarianceSettings,
    #[serde(default)]
    pub settings: OptimizationSettings,
}

impl OptimizationRequest {
    pub fn tickers(&self) -> Vec<String> {
        self.universe.iter().map(|a| a.ticker.clone()).collect()
    }

    /// Shape checks that need no data.
    pub fn validate(&self) -> MeridianResult<()> {
        validate_universe(&self.universe)?;
        validate_window(&self.window)?;
        self.preference.validate()?;
        self.settings.solver.validate()
    }
}

pub(crate) fn validate_universe(universe: &[Asset]) -> MeridianResult<()> {
    if universe.is_empty() {
        return Err(MeridianError::InvalidInput {
            field: "universe".into(),
            reason: "At least one asset required".into(),
        });
    }
    let mut seen = HashSet::new();
    for asset in universe {
        if !seen.insert(asset.ticker.as_str()) {
            return Err(MeridianError::InvalidInput {
                field: "universe".into(),
                reason: format!("Duplicate ticker {}", asset.ticker),
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_window(window: &EstimationWindow) -> MeridianResult<()> {
    if window.start >= window.end {
        return Err(MeridianError::InvalidInput {
            field: "window".into(),
            reason: format!("Start {} must precede end {}", window.start, window.end),
        });
    }
    if window.lookback_periods == Some(0) {
        return Err(MeridianError::InvalidInput {
            field: "window.lookback_periods".into(),
            reason: "Lookback must be positive".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON input documents (CLI and bindings)
// ---------------------------------------------------------------------------

/// Request plus the price history it runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeInput {
    pub request: OptimizationRequest,
    pub price_history: Vec<PriceSeries>,
}

/// Estimation only: expected returns and covariance for a universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateInput {
    pub universe: Vec<Asset>,
    pub model: ReturnModel,
    pub window: EstimationWindow,
    #[serde(default)]
    pub covariance: CovarianceSettings,
    pub price_history: Vec<PriceSeries>,
}

/// Optimisation over caller-supplied estimates; no history involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppliedEstimatesInput {
    pub tickers: Vec<String>,
    pub expected_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
    #[serde(default)]
    pub preference: Preference,
    #[serde(default)]
    pub caps: DiversificationCaps,
    #[serde(default)]
    pub covariance: CovarianceSettings,
    #[serde(default)]
    pub settings: OptimizationSettings,
}
