use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MeridianError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Missing asset mapping: {asset} has asset class '{asset_class}' with no consensus assumption")]
    MissingAssetMapping { asset: String, asset_class: String },

    #[error("Insufficient data: {asset} has {available} overlapping observations, {required} required")]
    DataInsufficient {
        asset: String,
        required: usize,
        available: usize,
    },

    #[error("Infeasible constraints: {reason} (shortfall: {shortfall})")]
    InfeasibleConstraint { reason: String, shortfall: Decimal },

    #[error("Non-convergence: solver gave up after {attempts} attempts (residual: {residual})")]
    NonConvergence { attempts: u32, residual: Decimal },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MeridianError {
    fn from(e: serde_json::Error) -> Self {
        MeridianError::Serialization(e.to_string())
    }
}
