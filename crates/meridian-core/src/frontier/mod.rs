//! Efficient frontier construction.
//!
//! Covers:
//! 1. **Quadratic programming** -- a primal active-set method over the
//!    budget equality and per-asset box constraints ([`active_set`]).
//! 2. **Frontier solver** -- one trade-off point per call, with ridge
//!    retries and a minimum-norm tie-break ([`solver`]).
//! 3. **Frontier generator** -- sweep of target returns between the
//!    minimum-variance and maximum-return portfolios, and a bisection that
//!    solves a volatility target between two swept points ([`generator`]).

pub mod active_set;
pub mod generator;
pub mod solver;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MeridianError;
use crate::types::{Rate, Weight};
use crate::MeridianResult;

pub use generator::{
    generate_frontier, max_return_within_volatility, Frontier, DEFAULT_FRONTIER_POINTS, MAX_FRONTIER_POINTS,
};
pub use solver::{solve, Objective};

/// Hard cap on solver attempts, whatever the settings ask for.
pub const MAX_SOLVER_ATTEMPTS: u32 = 10;

/// One portfolio on the efficient frontier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    /// Target return the point was solved for.
    pub target_return: Rate,
    pub weights: Vec<Weight>,
    /// Realised expected return mu'w.
    pub expected_return: Rate,
    /// Realised volatility sqrt(w' Sigma w).
    pub volatility: Rate,
    pub sharpe_ratio: Decimal,
}

/// Numerical policy of the frontier solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Attempts before giving up; every retry adds a larger ridge.
    pub max_attempts: u32,
    /// First ridge, relative to the mean variance.
    pub initial_ridge: Decimal,
    /// Multiplier applied to the ridge on each further retry.
    pub ridge_growth: Decimal,
    /// Active-set iterations allowed per attempt.
    pub max_iterations: usize,
    /// Weight of the ||w||^2 tie-break term, relative to the mean variance.
    pub tie_tolerance: Decimal,
    /// Step and multiplier tolerance of the active-set method.
    pub convergence_tolerance: Decimal,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_ridge: dec!(0.000001),
            ridge_growth: dec!(100),
            max_iterations: 500,
            tie_tolerance: dec!(0.0000000001),
            convergence_tolerance: dec!(0.000000000001),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> MeridianResult<()> {
        if self.max_attempts == 0 || self.max_attempts > MAX_SOLVER_ATTEMPTS {
            return Err(MeridianError::InvalidInput {
                field: "solver.max_attempts".into(),
                reason: format!("Must be between 1 and {}", MAX_SOLVER_ATTEMPTS),
            });
        }
        if self.max_iterations == 0 {
            return Err(MeridianError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "Must be positive".into(),
            });
        }
        if self.initial_ridge <= Decimal::ZERO || self.ridge_growth < Decimal::ONE {
            return Err(MeridianError::InvalidInput {
                field: "solver.initial_ridge".into(),
                reason: "Ridge must be positive and non-decreasing".into(),
            });
        }
        if self.tie_tolerance < Decimal::ZERO || self.convergence_tolerance <= Decimal::ZERO {
            return Err(MeridianError::InvalidInput {
                field: "solver.tie_tolerance".into(),
                reason: "Tolerances must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Sharpe ratio with division-by-zero guard.
pub fn compute_sharpe(ret: Rate, rf: Rate, volatility: Rate) -> Decimal {
    if volatility.is_zero() {
        Decimal::ZERO
    } else {
        (ret - rf) / volatility
    }
}
