//! Primal active-set method for convex quadratic programs of the form
//!
//! ```text
//! minimise   0.5 w'Qw + c'w
//! subject to A w = b          (rows of A linearly independent)
//!            l <= w <= u
//! ```
//!
//! The caller supplies a feasible starting point; every iterate stays
//! feasible. Each iteration solves the equality-constrained subproblem on
//! the current working set through its KKT system, then either takes a
//! (possibly blocked) step or releases the bound whose multiplier has the
//! wrong sign.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::math::{mat_vec_multiply, matrix_rank, solve_linear_system};

/// Rank tolerance used when deciding whether a bound row is independent of
/// the rows already in the working set.
const RANK_TOLERANCE: Decimal = dec!(0.000000000001);

pub(crate) struct QuadraticProgram<'a> {
    pub hessian: Vec<Vec<Decimal>>,
    pub linear: Vec<Decimal>,
    pub equalities: &'a [Vec<Decimal>],
    pub lower: &'a [Decimal],
    pub upper: &'a [Decimal],
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum QpFailure {
    /// KKT matrix could not be factorised.
    SingularSystem { residual: Decimal },
    /// Iteration budget spent before the multipliers settled.
    IterationLimit { residual: Decimal },
}

impl QpFailure {
    pub fn residual(&self) -> Decimal {
        match self {
            QpFailure::SingularSystem { residual } | QpFailure::IterationLimit { residual } => *residual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveBound {
    index: usize,
    at_upper: bool,
}

pub(crate) fn minimize(
    qp: &QuadraticProgram<'_>,
    start: Vec<Decimal>,
    max_iterations: usize,
    tolerance: Decimal,
) -> Result<Vec<Decimal>, QpFailure> {
    let n = start.len();
    let mut w = start;
    let mut working: Vec<ActiveBound> = Vec::new();

    for i in 0..n {
        let at_upper = if (w[i] - qp.lower[i]).abs() <= tolerance {
            false
        } else if (qp.upper[i] - w[i]).abs() <= tolerance {
            true
        } else {
            continue;
        };
        if is_independent(qp.equalities, &working, i, n) {
            w[i] = if at_upper { qp.upper[i] } else { qp.lower[i] };
            working.push(ActiveBound { index: i, at_upper });
        }
    }

    let mut last_step = Decimal::ZERO;
    for _ in 0..max_iterations {
        let gradient = objective_gradient(qp, &w);
        let (step, multipliers) = match solve_subproblem(qp, &working, &gradient) {
            Some(solution) => solution,
            None => {
                return Err(QpFailure::SingularSystem {
                    residual: zero_step_residual(&gradient),
                })
            }
        };

        let step_size = step.iter().map(|p| p.abs()).fold(Decimal::ZERO, Decimal::max);
        last_step = step_size;

        if step_size <= tolerance {
            let gradient_scale = gradient.iter().map(|g| g.abs()).fold(Decimal::ONE, Decimal::max);
            let threshold = tolerance * gradient_scale;
            let mut worst: Option<(usize, Decimal)> = None;
            for (k, bound) in working.iter().enumerate() {
                let violation = if bound.at_upper { -multipliers[k] } else { multipliers[k] };
                if violation > threshold && worst.map_or(true, |(_, v)| violation > v) {
                    worst = Some((k, violation));
                }
            }
            match worst {
                None => return Ok(w),
                Some((k, _)) => {
                    working.remove(k);
                    continue;
                }
            }
        }

        // Ratio test against bounds outside the working set
        let negligible = tolerance * step_size;
        let mut alpha = Decimal::ONE;
        let mut blocking: Option<ActiveBound> = None;
        for i in 0..n {
            if working.iter().any(|b| b.index == i) {
                continue;
            }
            let (room, at_upper) = if step[i] < -negligible {
                ((w[i] - qp.lower[i]).max(Decimal::ZERO) / -step[i], false)
            } else if step[i] > negligible {
                ((qp.upper[i] - w[i]).max(Decimal::ZERO) / step[i], true)
            } else {
                continue;
            };
            if room < alpha {
                alpha = room;
                blocking = Some(ActiveBound { index: i, at_upper });
            }
        }

        for (wi, pi) in w.iter_mut().zip(step.iter()) {
            *wi += alpha * *pi;
        }
        if let Some(bound) = blocking {
            w[bound.index] = if bound.at_upper {
                qp.upper[bound.index]
            } else {
                qp.lower[bound.index]
            };
            working.push(bound);
        }
    }

    Err(QpFailure::IterationLimit { residual: last_step })
}

fn objective_gradient(qp: &QuadraticProgram<'_>, w: &[Decimal]) -> Vec<Decimal> {
    mat_vec_multiply(&qp.hessian, w)
        .into_iter()
        .zip(qp.linear.iter())
        .map(|(qw, c)| qw + *c)
        .collect()
}

/// Solve
///
/// ```text
/// [ Q  A'  E' ] [p]   [-g]
/// [ A  0   0  ] [v] = [ 0]
/// [ E  0   0  ] [z]   [ 0]
/// ```
///
/// where E holds one unit row per working bound. Returns the step p and the
/// bound multipliers z (in working-set order).
fn solve_subproblem(
    qp: &QuadraticProgram<'_>,
    working: &[ActiveBound],
    gradient: &[Decimal],
) -> Option<(Vec<Decimal>, Vec<Decimal>)> {
    let n = gradient.len();
    let m = qp.equalities.len();
    let size = n + m + working.len();

    let mut kkt = vec![vec![Decimal::ZERO; size]; size];
    for i in 0..n {
        kkt[i][..n].copy_from_slice(&qp.hessian[i]);
    }
    for (j, row) in qp.equalities.iter().enumerate() {
        for i in 0..n {
            kkt[i][n + j] = row[i];
            kkt[n + j][i] = row[i];
        }
    }
    for (k, bound) in working.iter().enumerate() {
        kkt[bound.index][n + m + k] = Decimal::ONE;
        kkt[n + m + k][bound.index] = Decimal::ONE;
    }

    let mut rhs = vec![Decimal::ZERO; size];
    for i in 0..n {
        rhs[i] = -gradient[i];
    }

    let solution = solve_linear_system(&kkt, &rhs)?;
    let step = solution[..n].to_vec();
    let multipliers = solution[n + m..].to_vec();
    Some((step, multipliers))
}

fn is_independent(equalities: &[Vec<Decimal>], working: &[ActiveBound], candidate: usize, n: usize) -> bool {
    let mut rows: Vec<Vec<Decimal>> = equalities.to_vec();
    for index in working.iter().map(|b| b.index).chain(std::iter::once(candidate)) {
        let mut unit = vec![Decimal::ZERO; n];
        unit[index] = Decimal::ONE;
        rows.push(unit);
    }
    matrix_rank(&rows, RANK_TOLERANCE) == rows.len()
}

/// Residual of the KKT system for the zero step, the largest gradient
/// component. Nonzero whenever a factorisation failure leaves the iterate
/// with somewhere to move.
fn zero_step_residual(gradient: &[Decimal]) -> Decimal {
    gradient.iter().map(|g| g.abs()).fold(Decimal::ZERO, Decimal::max)
}
