//! Expected-return models.
//!
//! Two interchangeable sources sit behind one tagged enum so that the model
//! choice is an explicit, serialisable input of every computation:
//! 1. **Consensus** -- forward-looking capital market assumptions per asset
//!    class, with composite (fund) assets blended from several classes.
//! 2. **Historical CAPM** -- trailing betas against a market index, priced
//!    with a risk-free rate and a market risk premium.

pub mod capm;
pub mod consensus;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::MeridianError;
use crate::market_data::ReturnSeries;
use crate::types::{Asset, Rate, ReturnFrequency};
use crate::MeridianResult;

pub use capm::CapmParameters;
pub use consensus::{ClassAssumption, ClassExposure, ConsensusTable};

/// Which expected-return source to use, carrying its own parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ReturnModel {
    Consensus(ConsensusTable),
    HistoricalCapm(CapmParameters),
}

impl ReturnModel {
    pub fn label(&self) -> &'static str {
        match self {
            ReturnModel::Consensus(_) => "consensus",
            ReturnModel::HistoricalCapm(_) => "historical_capm",
        }
    }

    /// Tickers beyond the universe whose history the model needs.
    pub fn auxiliary_tickers(&self) -> Vec<String> {
        match self {
            ReturnModel::Consensus(_) => Vec::new(),
            ReturnModel::HistoricalCapm(p) => vec![p.market_index.clone()],
        }
    }

    pub fn requires_history(&self) -> bool {
        matches!(self, ReturnModel::HistoricalCapm(_))
    }

    /// Checks that need no price history, such as every asset class having
    /// a consensus mapping.
    pub fn check_universe(&self, universe: &[Asset]) -> MeridianResult<()> {
        match self {
            ReturnModel::Consensus(table) => {
                table.validate()?;
                for asset in universe {
                    table.expected_return(asset)?;
                }
                Ok(())
            }
            ReturnModel::HistoricalCapm(_) => Ok(()),
        }
    }
}

/// Annualised expected return per asset, in universe order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnVector {
    pub tickers: Vec<String>,
    pub values: Vec<Rate>,
    /// Estimated betas, present for the CAPM model only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub betas: Option<Vec<Decimal>>,
}

impl ReturnVector {
    /// Build from caller-supplied estimates.
    pub fn from_values(tickers: Vec<String>, values: Vec<Rate>) -> MeridianResult<Self> {
        if tickers.len() != values.len() {
            return Err(MeridianError::InvalidInput {
                field: "expected_returns".into(),
                reason: format!(
                    "Expected {} returns but got {}",
                    tickers.len(),
                    values.len()
                ),
            });
        }
        Ok(Self {
            tickers,
            values,
            betas: None,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<Rate> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.values[i])
    }

    pub fn as_slice(&self) -> &[Rate] {
        &self.values
    }
}

/// Produce the expected-return vector for `universe` under `model`.
///
/// `history` holds windowed return series keyed by ticker; the consensus
/// model ignores it.
pub fn estimate_expected_returns(
    model: &ReturnModel,
    universe: &[Asset],
    history: &HashMap<String, ReturnSeries>,
    frequency: ReturnFrequency,
) -> MeridianResult<ReturnVector> {
    let tickers: Vec<String> = universe.iter().map(|a| a.ticker.clone()).collect();
    match model {
        ReturnModel::Consensus(table) => {
            table.validate()?;
            let values = universe
                .iter()
                .map(|asset| table.expected_return(asset))
                .collect::<MeridianResult<Vec<_>>>()?;
            Ok(ReturnVector {
                tickers,
                values,
                betas: None,
            })
        }
        ReturnModel::HistoricalCapm(params) => {
            let estimates = capm::capm_expected_returns(params, universe, history, frequency)?;
            let (values, betas): (Vec<_>, Vec<_>) =
                estimates.into_iter().map(|e| (e.expected_return, e.beta)).unzip();
            Ok(ReturnVector {
                tickers,
                values,
                betas: Some(betas),
            })
        }
    }
}
