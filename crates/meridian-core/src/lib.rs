pub mod allocation;
pub mod catalog;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod expected_returns;
pub mod frontier;
pub mod market_data;
pub mod math;
pub mod risk_model;
pub mod types;

pub use allocation::{dollar_allocation, OptimizationResult, Preference};
pub use constraints::{ConstraintBuilder, ConstraintSet, DiversificationCaps};
pub use engine::{compute_estimates, optimize_supplied, optimize_with_estimates, Engine, Estimates, OptimizationRequest};
pub use error::MeridianError;
pub use expected_returns::{ReturnModel, ReturnVector};
pub use frontier::{FrontierPoint, SolverSettings};
pub use market_data::{InMemoryPriceHistory, PriceHistoryProvider};
pub use risk_model::{CovarianceMatrix, CovarianceSettings, ShrinkageIntensity};
pub use types::*;

/// Standard result type for all meridian operations
pub type MeridianResult<T> = Result<T, MeridianError>;
