use rust_decimal::Decimal;

use crate::market_data::returns::mean;
use crate::math::is_positive_semidefinite;
use crate::types::Diagnostic;

/// Number of equal steps between no shrinkage and the pure diagonal target.
const SHRINKAGE_STEPS: u32 = 20;

/// (1 - delta) * S + delta * diag(S)
pub fn shrink_toward_diagonal(sample: &[Vec<Decimal>], intensity: Decimal) -> Vec<Vec<Decimal>> {
    let keep = Decimal::ONE - intensity;
    sample
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, v)| if i == j { *v } else { *v * keep })
                .collect()
        })
        .collect()
}

/// Ledoit-Wolf intensity for shrinking toward the diagonal of the sample
/// covariance, from date-aligned returns (one column per asset).
///
/// ```text
/// y_ti  = r_ti - mean_i
/// s_ij  = 1/T * sum_t y_ti y_tj
/// pi_ij = 1/T * sum_t (y_ti y_tj - s_ij)^2
/// delta = sum_{i<j} pi_ij / (T * sum_{i<j} s_ij^2), clipped to [0, 1]
/// ```
///
/// The target keeps every variance, so only off-diagonal terms enter. Zero
/// when fewer than two assets or two observations, or when the sample has
/// no covariance left to shrink.
pub fn ledoit_wolf_intensity(columns: &[Vec<Decimal>]) -> Decimal {
    let n = columns.len();
    let t = columns.iter().map(Vec::len).min().unwrap_or(0);
    if n < 2 || t < 2 {
        return Decimal::ZERO;
    }
    let count = Decimal::from(t as u64);
    let centred: Vec<Vec<Decimal>> = columns
        .iter()
        .map(|c| {
            let m = mean(&c[..t]);
            c[..t].iter().map(|x| *x - m).collect()
        })
        .collect();

    let mut pi_sum = Decimal::ZERO;
    let mut gamma = Decimal::ZERO;
    for i in 0..n {
        for j in (i + 1)..n {
            let products: Vec<Decimal> = (0..t).map(|k| centred[i][k] * centred[j][k]).collect();
            let s = products.iter().sum::<Decimal>() / count;
            pi_sum += products.iter().map(|p| (*p - s) * (*p - s)).sum::<Decimal>() / count;
            gamma += s * s;
        }
    }
    if gamma.is_zero() {
        return Decimal::ZERO;
    }
    (pi_sum / (count * gamma)).max(Decimal::ZERO).min(Decimal::ONE)
}

/// Return `sample` unchanged when PSD; otherwise the least-shrunk matrix on
/// the fixed intensity grid (1/20, 2/20, ..., 1) that passes, plus the event.
///
/// Intensity 1 is the diagonal itself, which is PSD whenever the diagonal is
/// positive, so the sweep always terminates with a valid matrix.
pub fn enforce_psd(sample: Vec<Vec<Decimal>>, tolerance: Decimal) -> (Vec<Vec<Decimal>>, Option<Diagnostic>) {
    if is_positive_semidefinite(&sample, tolerance) {
        return (sample, None);
    }
    for step in 1..SHRINKAGE_STEPS {
        let intensity = Decimal::from(step) / Decimal::from(SHRINKAGE_STEPS);
        let shrunk = shrink_toward_diagonal(&sample, intensity);
        if is_positive_semidefinite(&shrunk, tolerance) {
            return (shrunk, Some(shrunk_event(intensity)));
        }
    }
    (
        shrink_toward_diagonal(&sample, Decimal::ONE),
        Some(shrunk_event(Decimal::ONE)),
    )
}

fn shrunk_event(intensity: Decimal) -> Diagnostic {
    Diagnostic::CovarianceShrunk {
        intensity,
        target: "diagonal".into(),
    }
}
