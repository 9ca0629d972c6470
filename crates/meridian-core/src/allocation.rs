//! Selection of one frontier point from a stated preference, and the
//! analytics reported alongside it.
//!
//! Covers:
//! 1. **Preference selection** -- risk tolerance, explicit target return or
//!    volatility, a 1-10 risk score, or maximum Sharpe.
//! 2. **Portfolio analytics** -- Sharpe ratio, correlation matrix, per-asset
//!    return and risk contributions, HHI, diversification ratio.
//! 3. **Dollar allocation** -- splitting an investment amount by weight.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MeridianError;
use crate::expected_returns::ReturnVector;
use crate::frontier::{Frontier, FrontierPoint};
use crate::math::mat_vec_multiply;
use crate::risk_model::CovarianceMatrix;
use crate::types::{Diagnostic, Rate, Weight};
use crate::MeridianResult;

/// Volatility targeted by risk score 1.
const RISK_SCORE_MIN_VOL: Rate = dec!(0.05);
/// Volatility targeted by risk score 10.
const RISK_SCORE_MAX_VOL: Rate = dec!(0.25);

/// How the caller wants to trade risk for return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Preference {
    /// 0 = minimum variance, 1 = maximum return; interpolated in volatility.
    RiskTolerance(Decimal),
    /// Frontier point with the nearest realised return.
    TargetReturn(Rate),
    /// Highest-return portfolio with volatility at or below the target,
    /// solved between the two swept points that bracket it.
    TargetVolatility(Rate),
    /// 1 (conservative) to 10 (aggressive), mapped onto 5%-25% volatility.
    RiskScore(u8),
    MaxSharpe,
}

impl Default for Preference {
    fn default() -> Self {
        Preference::RiskTolerance(dec!(0.5))
    }
}

impl Preference {
    pub fn validate(&self) -> MeridianResult<()> {
        match self {
            Preference::RiskTolerance(t) if *t < Decimal::ZERO || *t > Decimal::ONE => Err(MeridianError::InvalidInput {
                field: "preference.risk_tolerance".into(),
                reason: format!("Must be in [0, 1], got {}", t),
            }),
            Preference::TargetVolatility(v) if *v < Decimal::ZERO => Err(MeridianError::InvalidInput {
                field: "preference.target_volatility".into(),
                reason: "Volatility target cannot be negative".into(),
            }),
            Preference::RiskScore(s) if !(1..=10).contains(s) => Err(MeridianError::InvalidInput {
                field: "preference.risk_score".into(),
                reason: format!("Must be between 1 and 10, got {}", s),
            }),
            _ => Ok(()),
        }
    }

    /// Volatility ceiling for preferences that state one.
    pub fn volatility_target(&self) -> Option<Rate> {
        match self {
            Preference::TargetVolatility(v) => Some(*v),
            Preference::RiskScore(s) => Some(risk_score_volatility(*s)),
            _ => None,
        }
    }
}

/// Target volatility for a 1-10 risk score.
pub fn risk_score_volatility(score: u8) -> Rate {
    let steps = Decimal::from(score.clamp(1, 10) - 1);
    RISK_SCORE_MIN_VOL + (RISK_SCORE_MAX_VOL - RISK_SCORE_MIN_VOL) * steps / dec!(9)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub ticker: String,
    pub weight: Weight,
    pub expected_return: Rate,
    /// w_i * mu_i
    pub return_contribution: Rate,
    /// w_i * (Sigma w)_i / sigma_p; sums to portfolio volatility.
    pub risk_contribution: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub tickers: Vec<String>,
    pub preference: Preference,
    pub selected: FrontierPoint,
    pub allocations: Vec<AssetAllocation>,
    pub expected_return: Rate,
    pub volatility: Rate,
    pub sharpe_ratio: Decimal,
    pub risk_free_rate: Rate,
    pub correlation_matrix: Vec<Vec<Decimal>>,
    /// Herfindahl-Hirschman index of the weights.
    pub hhi_concentration: Decimal,
    /// Weighted average asset volatility over portfolio volatility.
    pub diversification_ratio: Decimal,
    pub efficient_frontier: Vec<FrontierPoint>,
    pub min_variance: FrontierPoint,
    pub max_return: FrontierPoint,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DollarAllocation {
    pub ticker: String,
    pub weight: Weight,
    pub amount: Decimal,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Index of the frontier point matching `preference`, plus any diagnostic
/// raised by a fallback. `points` must be non-empty and volatility-ordered.
pub fn select_point(points: &[FrontierPoint], preference: &Preference) -> MeridianResult<(usize, Option<Diagnostic>)> {
    preference.validate()?;
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(MeridianError::InvalidInput {
                field: "frontier".into(),
                reason: "Frontier has no points".into(),
            })
        }
    };

    let selection = match preference {
        Preference::RiskTolerance(t) => {
            let desired = first.volatility + *t * (last.volatility - first.volatility);
            (nearest_by(points, |p| (p.volatility - desired).abs()), None)
        }
        Preference::TargetReturn(r) => (nearest_by(points, |p| (p.expected_return - *r).abs()), None),
        Preference::TargetVolatility(v) => by_volatility(points, *v),
        Preference::RiskScore(s) => by_volatility(points, risk_score_volatility(*s)),
        Preference::MaxSharpe => (max_sharpe(points), None),
    };
    Ok(selection)
}

/// Smallest distance wins; earlier (lower-risk) points win ties.
fn nearest_by<F: Fn(&FrontierPoint) -> Decimal>(points: &[FrontierPoint], distance: F) -> usize {
    let mut best = 0;
    let mut best_distance = distance(&points[0]);
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = distance(p);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

fn max_sharpe(points: &[FrontierPoint]) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        if p.sharpe_ratio > points[best].sharpe_ratio {
            best = i;
        }
    }
    best
}

fn by_volatility(points: &[FrontierPoint], target: Rate) -> (usize, Option<Diagnostic>) {
    let min_vol = points[0].volatility;
    let max_vol = points[points.len() - 1].volatility;
    if target < min_vol {
        tracing::warn!(%target, %min_vol, "target volatility unreachable, using max Sharpe");
        let event = Diagnostic::TargetVolatilityUnreachable {
            target_volatility: target,
            min_volatility: min_vol,
            max_volatility: max_vol,
        };
        return (max_sharpe(points), Some(event));
    }
    // Volatility is non-decreasing along the frontier, so the last admissible
    // point has the highest return.
    let idx = points.iter().rposition(|p| p.volatility <= target).unwrap_or(0);
    (idx, None)
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Pick the preferred point from `frontier` and compute its analytics.
///
/// `refined` replaces the swept point for a volatility target when it was
/// solved exactly between two sweep points. `diagnostics` carries events
/// raised upstream (covariance repair); the frontier's own and any selection
/// fallback are appended.
pub fn assemble_result(
    frontier: Frontier,
    refined: Option<FrontierPoint>,
    covariance: &CovarianceMatrix,
    expected_returns: &ReturnVector,
    preference: Preference,
    risk_free_rate: Rate,
    mut diagnostics: Vec<Diagnostic>,
) -> MeridianResult<OptimizationResult> {
    let (index, fallback) = select_point(&frontier.points, &preference)?;
    let selected = match refined {
        Some(point) if fallback.is_none() => point,
        _ => frontier.points[index].clone(),
    };
    diagnostics.extend(frontier.diagnostics.iter().cloned());
    diagnostics.extend(fallback);

    let weights = &selected.weights;
    let sigma = covariance.rows();
    let mu = expected_returns.as_slice();
    let vol = selected.volatility;

    let marginal = mat_vec_multiply(sigma, weights);
    let allocations: Vec<AssetAllocation> = covariance
        .tickers()
        .iter()
        .enumerate()
        .map(|(i, ticker)| AssetAllocation {
            ticker: ticker.clone(),
            weight: weights[i],
            expected_return: mu[i],
            return_contribution: weights[i] * mu[i],
            risk_contribution: if vol.is_zero() {
                Decimal::ZERO
            } else {
                weights[i] * marginal[i] / vol
            },
        })
        .collect();

    let hhi_concentration: Decimal = weights.iter().map(|w| *w * *w).sum();
    let weighted_vol: Decimal = weights
        .iter()
        .zip(covariance.volatilities().iter())
        .map(|(w, s)| *w * *s)
        .sum();
    let diversification_ratio = if vol.is_zero() {
        Decimal::ONE
    } else {
        weighted_vol / vol
    };

    Ok(OptimizationResult {
        tickers: covariance.tickers().to_vec(),
        preference,
        expected_return: selected.expected_return,
        volatility: vol,
        sharpe_ratio: selected.sharpe_ratio,
        selected,
        allocations,
        risk_free_rate,
        correlation_matrix: covariance.correlation(),
        hhi_concentration,
        diversification_ratio,
        efficient_frontier: frontier.points,
        min_variance: frontier.min_variance,
        max_return: frontier.max_return,
        diagnostics,
    })
}

/// Split `amount` across the selected weights, rounded to cents; rounding
/// residue goes to the largest position so the amounts add up.
pub fn dollar_allocation(result: &OptimizationResult, amount: Decimal) -> MeridianResult<Vec<DollarAllocation>> {
    if amount <= Decimal::ZERO {
        return Err(MeridianError::InvalidInput {
            field: "amount".into(),
            reason: "Investment amount must be positive".into(),
        });
    }
    let mut out: Vec<DollarAllocation> = result
        .allocations
        .iter()
        .map(|a| DollarAllocation {
            ticker: a.ticker.clone(),
            weight: a.weight,
            amount: (a.weight * amount).round_dp(2),
        })
        .collect();

    let residue = amount.round_dp(2) - out.iter().map(|a| a.amount).sum::<Decimal>();
    if !residue.is_zero() {
        if let Some(largest) = out.iter_mut().rev().max_by(|a, b| a.weight.cmp(&b.weight)) {
            largest.amount += residue;
        }
    }
    Ok(out)
}
