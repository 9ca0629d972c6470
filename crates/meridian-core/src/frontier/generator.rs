use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::solver::{solve, Objective};
use super::{compute_sharpe, FrontierPoint, SolverSettings};
use crate::constraints::ConstraintSet;
use crate::error::MeridianError;
use crate::math::{portfolio_volatility, vec_dot};
use crate::types::{Diagnostic, Rate, Weight};
use crate::MeridianResult;

pub const DEFAULT_FRONTIER_POINTS: usize = 20;
pub const MAX_FRONTIER_POINTS: usize = 200;

/// Return spans below this are treated as a single-point frontier.
const DEGENERATE_SPAN: Decimal = dec!(0.000000000001);

/// Bisection steps when solving for a volatility target between two
/// frontier points.
const VOLATILITY_BISECTION_STEPS: usize = 40;

/// Ordered efficient frontier plus its two anchor portfolios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontier {
    /// Non-decreasing in both target return and volatility.
    pub points: Vec<FrontierPoint>,
    pub min_variance: FrontierPoint,
    pub max_return: FrontierPoint,
    pub diagnostics: Vec<Diagnostic>,
}

/// Sweep `points` evenly spaced target returns from the minimum-variance
/// return to the maximum attainable return.
///
/// Interior points are independent solver calls and run on the rayon pool
/// when the `parallel` feature is on; output order follows the targets.
pub fn generate_frontier(
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    constraints: &ConstraintSet,
    risk_free_rate: Rate,
    points: usize,
    settings: &SolverSettings,
) -> MeridianResult<Frontier> {
    if !(2..=MAX_FRONTIER_POINTS).contains(&points) {
        return Err(MeridianError::InvalidInput {
            field: "frontier_points".into(),
            reason: format!("Must be between 2 and {}, got {}", MAX_FRONTIER_POINTS, points),
        });
    }

    let build = |target: Rate, weights: Vec<Weight>| {
        make_point(target, weights, expected_returns, covariance, risk_free_rate)
    };

    let mv_weights = solve(Objective::MinVariance, expected_returns, covariance, constraints, settings)?;
    let mv_return = vec_dot(expected_returns, &mv_weights);
    let min_variance = build(mv_return, mv_weights);

    let mr_weights = solve(Objective::MaxReturn, expected_returns, covariance, constraints, settings)?;
    let mr_return = vec_dot(expected_returns, &mr_weights);
    let max_return = build(mr_return, mr_weights);

    let span = mr_return - mv_return;
    if span <= DEGENERATE_SPAN {
        tracing::debug!("degenerate return range, frontier collapses to one point");
        return Ok(Frontier {
            points: vec![min_variance.clone()],
            min_variance,
            max_return,
            diagnostics: Vec::new(),
        });
    }

    let step = span / Decimal::from((points - 1) as u64);
    let solve_target = |k: usize| -> MeridianResult<FrontierPoint> {
        let target = mv_return + step * Decimal::from(k as u64);
        let weights = solve(Objective::TargetReturn(target), expected_returns, covariance, constraints, settings)?;
        Ok(build(target, weights))
    };

    #[cfg(feature = "parallel")]
    let interior: Vec<MeridianResult<FrontierPoint>> = (1..points - 1).into_par_iter().map(solve_target).collect();
    #[cfg(not(feature = "parallel"))]
    let interior: Vec<MeridianResult<FrontierPoint>> = (1..points - 1).map(solve_target).collect();

    let mut sweep = Vec::with_capacity(points);
    sweep.push(min_variance.clone());
    for point in interior {
        sweep.push(point?);
    }
    sweep.push(max_return.clone());

    let (kept, diagnostics) = enforce_monotonic(sweep);
    tracing::debug!(requested = points, kept = kept.len(), "frontier generated");

    Ok(Frontier {
        points: kept,
        min_variance,
        max_return,
        diagnostics,
    })
}

/// Highest-return portfolio with volatility at or below `target`.
///
/// `points` is a volatility-ordered sweep. The answer lies between the last
/// point within the target and the first point beyond it; volatility grows
/// with the return target along the efficient frontier, so bisecting that
/// return range converges on it. Returns `None` when the sweep already
/// holds the answer: the target is below the minimum variance, at or above
/// the last point, or met exactly by a swept point. A solver failure inside
/// the bracket stops the search at the best portfolio found so far.
pub fn max_return_within_volatility(
    points: &[FrontierPoint],
    target: Rate,
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    constraints: &ConstraintSet,
    risk_free_rate: Rate,
    settings: &SolverSettings,
) -> Option<FrontierPoint> {
    let idx = points.iter().rposition(|p| p.volatility <= target)?;
    let next = points.get(idx + 1)?;
    if points[idx].volatility == target {
        return None;
    }

    let mut lo = points[idx].expected_return;
    let mut hi = next.expected_return;
    let mut best: Option<FrontierPoint> = None;
    for _ in 0..VOLATILITY_BISECTION_STEPS {
        if hi - lo <= DEGENERATE_SPAN {
            break;
        }
        let mid = (lo + hi) / dec!(2);
        let weights = match solve(Objective::TargetReturn(mid), expected_returns, covariance, constraints, settings) {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(%mid, %err, "volatility bisection stopped early");
                break;
            }
        };
        let candidate = make_point(mid, weights, expected_returns, covariance, risk_free_rate);
        if candidate.volatility <= target {
            lo = mid;
            best = Some(candidate);
        } else {
            hi = mid;
        }
    }

    if let Some(point) = &best {
        tracing::debug!(%target, volatility = %point.volatility, expected_return = %point.expected_return, "refined volatility target");
    }
    best
}

pub(crate) fn make_point(
    target: Rate,
    weights: Vec<Weight>,
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    risk_free_rate: Rate,
) -> FrontierPoint {
    let expected_return = vec_dot(expected_returns, &weights);
    let volatility = portfolio_volatility(&weights, covariance);
    FrontierPoint {
        target_return: target,
        sharpe_ratio: compute_sharpe(expected_return, risk_free_rate, volatility),
        weights,
        expected_return,
        volatility,
    }
}

/// Drop any point whose volatility falls below the last kept point's.
fn enforce_monotonic(sweep: Vec<FrontierPoint>) -> (Vec<FrontierPoint>, Vec<Diagnostic>) {
    let mut kept: Vec<FrontierPoint> = Vec::with_capacity(sweep.len());
    let mut diagnostics = Vec::new();
    for point in sweep {
        if let Some(previous) = kept.last() {
            if point.volatility < previous.volatility {
                tracing::warn!(
                    target_return = %point.target_return,
                    volatility = %point.volatility,
                    previous = %previous.volatility,
                    "dropping non-monotonic frontier point"
                );
                diagnostics.push(Diagnostic::FrontierPointDropped {
                    target_return: point.target_return,
                    volatility: point.volatility,
                    previous_volatility: previous.volatility,
                });
                continue;
            }
        }
        kept.push(point);
    }
    (kept, diagnostics)
}
