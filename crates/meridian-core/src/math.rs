//! Dense linear algebra over `Decimal` shared by the estimators and the solver.
//!
//! Matrices are row-major `Vec<Vec<Decimal>>`. Sizes here are asset counts
//! (tens at most), so plain O(n^3) routines are used throughout.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

/// Pivots smaller than this are treated as zero by the elimination routines.
const PIVOT_EPSILON: Decimal = dec!(0.00000000000000000001);

/// Dot product.
pub fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Matrix-vector multiplication.
pub fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form w' * M * w.
pub fn quadratic_form(w: &[Decimal], mat: &[Vec<Decimal>]) -> Decimal {
    vec_dot(w, &mat_vec_multiply(mat, w))
}

/// Portfolio standard deviation: sqrt(w' * Sigma * w).
pub fn portfolio_volatility(w: &[Decimal], sigma: &[Vec<Decimal>]) -> Decimal {
    sqrt_decimal(quadratic_form(w, sigma))
}

pub fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

/// Arithmetic mean of the diagonal, used to scale ridge and tie-break terms.
pub fn mean_diagonal(mat: &[Vec<Decimal>]) -> Decimal {
    if mat.is_empty() {
        return Decimal::ZERO;
    }
    let trace: Decimal = (0..mat.len()).map(|i| mat[i][i]).sum();
    trace / Decimal::from(mat.len() as i64)
}

/// Largest absolute entry; zero for an empty matrix.
pub fn max_abs(mat: &[Vec<Decimal>]) -> Decimal {
    mat.iter()
        .flat_map(|row| row.iter())
        .map(|v| v.abs())
        .fold(Decimal::ZERO, Decimal::max)
}

/// Solve A x = b by Gaussian elimination with partial pivoting.
///
/// Returns `None` when A is (numerically) singular.
#[allow(clippy::needless_range_loop)]
pub fn solve_linear_system(a: &[Vec<Decimal>], b: &[Decimal]) -> Option<Vec<Decimal>> {
    let n = a.len();
    if n == 0 {
        return Some(Vec::new());
    }

    let mut aug: Vec<Vec<Decimal>> = a
        .iter()
        .zip(b.iter())
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(*rhs);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val < PIVOT_EPSILON {
            return None;
        }
        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot_row = aug[col].clone();
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot_row[col];
            if factor.is_zero() {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()).skip(col) {
                *cell -= factor * pv;
            }
        }
    }

    let mut x = vec![Decimal::ZERO; n];
    for i in (0..n).rev() {
        let mut acc = aug[i][n];
        for j in (i + 1)..n {
            acc -= aug[i][j] * x[j];
        }
        x[i] = acc / aug[i][i];
    }
    Some(x)
}

/// Numerical rank of a set of row vectors (Gaussian elimination, relative tolerance).
#[allow(clippy::needless_range_loop)]
pub fn matrix_rank(rows: &[Vec<Decimal>], tolerance: Decimal) -> usize {
    if rows.is_empty() {
        return 0;
    }
    let mut m: Vec<Vec<Decimal>> = rows.to_vec();
    let n_rows = m.len();
    let n_cols = m[0].len();
    let scale = max_abs(&m).max(Decimal::ONE);
    let mut rank = 0;

    for col in 0..n_cols {
        if rank == n_rows {
            break;
        }
        let mut max_row = rank;
        let mut max_val = m[rank][col].abs();
        for row in (rank + 1)..n_rows {
            let val = m[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }
        if max_val <= tolerance * scale {
            continue;
        }
        m.swap(rank, max_row);
        let pivot_row = m[rank].clone();
        for row in (rank + 1)..n_rows {
            let factor = m[row][col] / pivot_row[col];
            for (cell, &pv) in m[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
        rank += 1;
    }
    rank
}

/// Positive semi-definiteness test via a semi-definite LDL' sweep.
///
/// A zero pivot is admitted only when the rest of its column is zero too;
/// tolerances are relative to the largest diagonal entry.
#[allow(clippy::needless_range_loop)]
pub fn is_positive_semidefinite(mat: &[Vec<Decimal>], tolerance: Decimal) -> bool {
    let n = mat.len();
    if n == 0 {
        return true;
    }
    let scale = (0..n)
        .map(|i| mat[i][i])
        .fold(Decimal::ZERO, Decimal::max);
    if scale <= Decimal::ZERO {
        return (0..n).all(|i| (0..n).all(|j| mat[i][j].is_zero()));
    }
    let tol = tolerance * scale;

    let mut l = vec![vec![Decimal::ZERO; n]; n];
    let mut d = vec![Decimal::ZERO; n];

    for k in 0..n {
        let mut dk = mat[k][k];
        for j in 0..k {
            dk -= l[k][j] * l[k][j] * d[j];
        }
        if dk < -tol {
            return false;
        }
        let zero_pivot = dk <= tol;
        d[k] = if zero_pivot { Decimal::ZERO } else { dk };
        l[k][k] = Decimal::ONE;

        for i in (k + 1)..n {
            let mut r = mat[i][k];
            for j in 0..k {
                r -= l[i][j] * l[k][j] * d[j];
            }
            if zero_pivot {
                if r.abs() > tol {
                    return false;
                }
                l[i][k] = Decimal::ZERO;
            } else {
                l[i][k] = r / dk;
            }
        }
    }
    true
}
