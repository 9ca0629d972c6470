use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::active_set::{self, QuadraticProgram};
use super::SolverSettings;
use crate::constraints::ConstraintSet;
use crate::error::MeridianError;
use crate::math::{matrix_rank, mean_diagonal, vec_dot};
use crate::types::{Rate, Weight};
use crate::MeridianResult;

/// Expected returns closer than this are treated as tied.
const RETURN_TIE: Decimal = dec!(0.000000000001);

/// Tolerance on the budget and bounds when accepting a solver iterate.
const FEASIBILITY_TOLERANCE: Decimal = dec!(0.00000001);

/// The trade-off being solved for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Objective {
    /// Lowest attainable variance.
    MinVariance,
    /// Lowest variance at exactly this expected return.
    TargetReturn(Rate),
    /// Highest attainable return; ties broken by lowest variance.
    MaxReturn,
    /// Maximise mu'w - lambda * w'Sigma w.
    RiskAversion(Decimal),
}

/// Solve one point of the constrained mean-variance problem.
///
/// Attempt 0 uses the covariance as given; each retry adds a growing ridge
/// to its diagonal. A small `tie_tolerance * ||w||^2` term is always present
/// so that degenerate optima resolve to the minimum-norm weight vector.
/// Returned weights are clipped to their bounds and sum to exactly 1.
pub fn solve(
    objective: Objective,
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    constraints: &ConstraintSet,
    settings: &SolverSettings,
) -> MeridianResult<Vec<Weight>> {
    let n = constraints.len();
    if expected_returns.len() != n || covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
        return Err(MeridianError::InvalidInput {
            field: "covariance".into(),
            reason: format!(
                "Dimensions disagree: {} bounds, {} expected returns, {} covariance rows",
                n,
                expected_returns.len(),
                covariance.len()
            ),
        });
    }
    settings.validate()?;

    let lower = constraints.lower();
    let upper = constraints.upper();

    let raw = match objective {
        Objective::MinVariance => {
            let mut start = lower.to_vec();
            let budget = Decimal::ONE - lower.iter().sum::<Decimal>();
            let all: Vec<usize> = (0..n).collect();
            water_fill(&all, &mut start, upper, budget);
            let problem = Problem::variance(covariance, vec![vec![Decimal::ONE; n]], lower.to_vec(), upper.to_vec(), start);
            run_attempts(&problem, settings)?
        }
        Objective::MaxReturn => solve_return_extreme(expected_returns, covariance, constraints, Direction::Highest, settings)?,
        Objective::TargetReturn(target) => solve_target_return(target, expected_returns, covariance, constraints, settings)?,
        Objective::RiskAversion(lambda) => {
            if lambda <= Decimal::ZERO {
                return Err(MeridianError::InvalidInput {
                    field: "risk_aversion".into(),
                    reason: "Risk aversion must be positive".into(),
                });
            }
            let mut start = lower.to_vec();
            let budget = Decimal::ONE - lower.iter().sum::<Decimal>();
            let all: Vec<usize> = (0..n).collect();
            water_fill(&all, &mut start, upper, budget);
            let problem = Problem {
                covariance,
                risk_weight: lambda,
                linear: expected_returns.iter().map(|m| -*m).collect(),
                equalities: vec![vec![Decimal::ONE; n]],
                lower: lower.to_vec(),
                upper: upper.to_vec(),
                start,
            };
            run_attempts(&problem, settings)?
        }
    };

    Ok(finalize_weights(raw, lower, upper))
}

/// Lowest and highest expected return attainable under the constraints.
pub fn return_range(expected_returns: &[Rate], constraints: &ConstraintSet) -> (Rate, Rate) {
    let lo = return_extreme(expected_returns, constraints.lower(), constraints.upper(), Direction::Lowest);
    let hi = return_extreme(expected_returns, constraints.lower(), constraints.upper(), Direction::Highest);
    (lo.value, hi.value)
}

// ---------------------------------------------------------------------------
// Problem set-up and retries
// ---------------------------------------------------------------------------

struct Problem<'a> {
    covariance: &'a [Vec<Decimal>],
    /// Multiplier on the covariance term (lambda for risk aversion, else 1).
    risk_weight: Decimal,
    linear: Vec<Decimal>,
    equalities: Vec<Vec<Decimal>>,
    lower: Vec<Decimal>,
    upper: Vec<Decimal>,
    start: Vec<Decimal>,
}

impl<'a> Problem<'a> {
    fn variance(
        covariance: &'a [Vec<Decimal>],
        equalities: Vec<Vec<Decimal>>,
        lower: Vec<Decimal>,
        upper: Vec<Decimal>,
        start: Vec<Decimal>,
    ) -> Self {
        let n = start.len();
        Self {
            covariance,
            risk_weight: Decimal::ONE,
            linear: vec![Decimal::ZERO; n],
            equalities,
            lower,
            upper,
            start,
        }
    }

    /// Q = 2 * risk_weight * (Sigma + ridge * I) + 2 * tie * I
    fn hessian(&self, ridge: Decimal, tie: Decimal) -> Vec<Vec<Decimal>> {
        let two = dec!(2);
        self.covariance
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| {
                        if i == j {
                            two * self.risk_weight * (*v + ridge) + two * tie
                        } else {
                            two * self.risk_weight * *v
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Largest violation of the equalities or bounds at `w`.
    fn infeasibility(&self, w: &[Decimal]) -> Decimal {
        let mut worst = Decimal::ZERO;
        for row in &self.equalities {
            let target = vec_dot(row, &self.start);
            worst = worst.max((vec_dot(row, w) - target).abs());
        }
        for (i, wi) in w.iter().enumerate() {
            worst = worst.max(self.lower[i] - *wi).max(*wi - self.upper[i]);
        }
        worst
    }
}

fn run_attempts(problem: &Problem<'_>, settings: &SolverSettings) -> MeridianResult<Vec<Decimal>> {
    let mut scale = mean_diagonal(problem.covariance);
    if scale <= Decimal::ZERO {
        scale = Decimal::ONE;
    }
    let tie = settings.tie_tolerance * scale;
    let mut ridge = Decimal::ZERO;
    let mut residual = Decimal::ZERO;

    for attempt in 0..settings.max_attempts {
        if attempt == 1 {
            ridge = settings.initial_ridge * scale;
        } else if attempt > 1 {
            ridge *= settings.ridge_growth;
        }

        let qp = QuadraticProgram {
            hessian: problem.hessian(ridge, tie),
            linear: problem.linear.clone(),
            equalities: &problem.equalities,
            lower: &problem.lower,
            upper: &problem.upper,
        };
        match active_set::minimize(
            &qp,
            problem.start.clone(),
            settings.max_iterations,
            settings.convergence_tolerance,
        ) {
            Ok(w) => {
                let gap = problem.infeasibility(&w);
                if gap <= FEASIBILITY_TOLERANCE {
                    if attempt > 0 {
                        tracing::info!(attempt, %ridge, "solver converged with ridge regularisation");
                    }
                    return Ok(w);
                }
                residual = gap;
                tracing::debug!(attempt, %gap, "solver iterate left the feasible region");
            }
            Err(failure) => {
                residual = failure.residual();
                tracing::debug!(attempt, %residual, ?failure, "active-set attempt failed");
            }
        }
    }

    tracing::warn!(attempts = settings.max_attempts, %residual, "solver exhausted retries");
    Err(MeridianError::NonConvergence {
        attempts: settings.max_attempts,
        residual,
    })
}

// ---------------------------------------------------------------------------
// Return extremes and target returns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Direction {
    Lowest,
    Highest,
}

struct ReturnExtreme {
    weights: Vec<Decimal>,
    value: Rate,
    /// Tied assets sharing the partially filled budget. Everything else is
    /// pinned at a bound in every portfolio attaining `value`.
    marginal: Vec<usize>,
}

/// Greedy fill of the budget in order of expected return: the linear
/// programme over a box plus budget has this closed-form solution.
fn return_extreme(expected_returns: &[Rate], lower: &[Weight], upper: &[Weight], direction: Direction) -> ReturnExtreme {
    let n = expected_returns.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let by_return = match direction {
            Direction::Highest => expected_returns[b].cmp(&expected_returns[a]),
            Direction::Lowest => expected_returns[a].cmp(&expected_returns[b]),
        };
        by_return.then(a.cmp(&b))
    });

    let mut weights = lower.to_vec();
    let mut budget = Decimal::ONE - lower.iter().sum::<Decimal>();
    let mut marginal = Vec::new();
    let mut k = 0;
    while k < n && budget > Decimal::ZERO {
        let mut end = k + 1;
        while end < n && (expected_returns[order[end]] - expected_returns[order[k]]).abs() <= RETURN_TIE {
            end += 1;
        }
        let group = &order[k..end];
        let capacity: Decimal = group.iter().map(|&i| upper[i] - lower[i]).sum();
        if capacity <= budget {
            for &i in group {
                weights[i] = upper[i];
            }
            budget -= capacity;
        } else {
            water_fill(group, &mut weights, upper, budget);
            budget = Decimal::ZERO;
            marginal = group.to_vec();
        }
        k = end;
    }

    let value = vec_dot(expected_returns, &weights);
    ReturnExtreme {
        weights,
        value,
        marginal,
    }
}

/// Spread `budget` equally over `indices`, capping each at its upper bound
/// and redistributing the excess.
fn water_fill(indices: &[usize], weights: &mut [Decimal], upper: &[Decimal], budget: Decimal) {
    let mut open: Vec<usize> = indices.iter().copied().filter(|&i| weights[i] < upper[i]).collect();
    let mut remaining = budget;
    while remaining > Decimal::ZERO && !open.is_empty() {
        let share = remaining / Decimal::from(open.len() as u64);
        let mut saturated = false;
        for &i in &open {
            let room = upper[i] - weights[i];
            if room <= share {
                weights[i] = upper[i];
                remaining -= room;
                saturated = true;
            }
        }
        if !saturated {
            for &i in &open {
                weights[i] += share;
            }
            break;
        }
        open.retain(|&i| weights[i] < upper[i]);
    }
}

/// Least-variance portfolio among those attaining the return extreme.
fn solve_return_extreme(
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    constraints: &ConstraintSet,
    direction: Direction,
    settings: &SolverSettings,
) -> MeridianResult<Vec<Decimal>> {
    let extreme = return_extreme(expected_returns, constraints.lower(), constraints.upper(), direction);
    if extreme.marginal.len() <= 1 {
        return Ok(extreme.weights);
    }

    // Pin every non-marginal asset where the greedy fill left it
    let mut lower = extreme.weights.clone();
    let mut upper = extreme.weights.clone();
    for &i in &extreme.marginal {
        lower[i] = constraints.lower()[i];
        upper[i] = constraints.upper()[i];
    }
    let n = lower.len();
    let problem = Problem::variance(covariance, vec![vec![Decimal::ONE; n]], lower, upper, extreme.weights);
    run_attempts(&problem, settings)
}

fn solve_target_return(
    target: Rate,
    expected_returns: &[Rate],
    covariance: &[Vec<Decimal>],
    constraints: &ConstraintSet,
    settings: &SolverSettings,
) -> MeridianResult<Vec<Decimal>> {
    let lo = return_extreme(expected_returns, constraints.lower(), constraints.upper(), Direction::Lowest);
    let hi = return_extreme(expected_returns, constraints.lower(), constraints.upper(), Direction::Highest);

    if target < lo.value - RETURN_TIE || target > hi.value + RETURN_TIE {
        let gap = if target < lo.value { lo.value - target } else { target - hi.value };
        tracing::warn!(%target, low = %lo.value, high = %hi.value, "target return unattainable under constraints");
        return Err(MeridianError::NonConvergence { attempts: 1, residual: gap });
    }

    let n = expected_returns.len();
    let span = hi.value - lo.value;
    if span <= RETURN_TIE {
        // Every feasible portfolio has the same return
        let mut start = constraints.lower().to_vec();
        let budget = Decimal::ONE - constraints.lower().iter().sum::<Decimal>();
        let all: Vec<usize> = (0..n).collect();
        water_fill(&all, &mut start, constraints.upper(), budget);
        let problem = Problem::variance(
            covariance,
            vec![vec![Decimal::ONE; n]],
            constraints.lower().to_vec(),
            constraints.upper().to_vec(),
            start,
        );
        return run_attempts(&problem, settings);
    }
    if (hi.value - target).abs() <= RETURN_TIE {
        return solve_return_extreme(expected_returns, covariance, constraints, Direction::Highest, settings);
    }
    if (target - lo.value).abs() <= RETURN_TIE {
        return solve_return_extreme(expected_returns, covariance, constraints, Direction::Lowest, settings);
    }

    let equalities = vec![vec![Decimal::ONE; n], expected_returns.to_vec()];
    if matrix_rank(&equalities, RETURN_TIE) < 2 {
        return Err(MeridianError::InvalidInput {
            field: "expected_returns".into(),
            reason: "Expected returns are constant; no return target can be imposed".into(),
        });
    }

    // Convex blend of the two extreme vertices hits the target exactly
    let theta = (target - lo.value) / span;
    let start: Vec<Decimal> = lo
        .weights
        .iter()
        .zip(hi.weights.iter())
        .map(|(a, b)| *a + theta * (*b - *a))
        .collect();
    let problem = Problem::variance(
        covariance,
        equalities,
        constraints.lower().to_vec(),
        constraints.upper().to_vec(),
        start,
    );
    run_attempts(&problem, settings)
}

// ---------------------------------------------------------------------------
// Output clean-up
// ---------------------------------------------------------------------------

/// Clip to bounds, then move any residual budget onto the assets with the
/// most slack so the weights sum to exactly 1.
pub(crate) fn finalize_weights(raw: Vec<Decimal>, lower: &[Weight], upper: &[Weight]) -> Vec<Weight> {
    let mut weights: Vec<Decimal> = raw
        .into_iter()
        .enumerate()
        .map(|(i, w)| w.max(lower[i]).min(upper[i]))
        .collect();

    let mut residual = Decimal::ONE - weights.iter().sum::<Decimal>();
    if residual.is_zero() {
        return weights;
    }

    let mut order: Vec<usize> = (0..weights.len()).collect();
    let slack = |i: usize, w: &[Decimal]| {
        if residual > Decimal::ZERO {
            upper[i] - w[i]
        } else {
            w[i] - lower[i]
        }
    };
    order.sort_by(|&a, &b| slack(b, &weights).cmp(&slack(a, &weights)).then(a.cmp(&b)));

    for i in order {
        if residual.is_zero() {
            break;
        }
        if residual > Decimal::ZERO {
            let add = residual.min(upper[i] - weights[i]);
            weights[i] += add;
            residual -= add;
        } else {
            let take = (-residual).min(weights[i] - lower[i]);
            weights[i] -= take;
            residual += take;
        }
    }
    weights
}
