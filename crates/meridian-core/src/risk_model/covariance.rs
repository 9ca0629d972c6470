use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::MeridianError;
use crate::market_data::returns::sample_covariance;
use crate::market_data::ReturnSeries;
use crate::risk_model::shrinkage::ledoit_wolf_intensity;
use crate::risk_model::{CovarianceEstimate, CovarianceMatrix, CovarianceSettings, ShrinkageIntensity};
use crate::types::ReturnFrequency;
use crate::MeridianResult;

/// Annualised sample covariance under the pairwise missing-data policy.
///
/// Each diagonal entry uses every observation of the asset inside the
/// window; each off-diagonal entry uses only the dates the two assets share,
/// with means taken over that overlap. This keeps all available history but
/// can yield a matrix that is not PSD, which `finalize` then repairs.
///
/// The Ledoit-Wolf intensity is estimated on the dates every asset shares;
/// with fewer of those than `min_observations` no shrinkage is applied.
pub fn estimate_covariance(
    tickers: &[String],
    history: &HashMap<String, ReturnSeries>,
    frequency: ReturnFrequency,
    settings: &CovarianceSettings,
) -> MeridianResult<CovarianceEstimate> {
    let n = tickers.len();
    if n == 0 {
        return Err(MeridianError::InvalidInput {
            field: "universe".into(),
            reason: "At least one asset required".into(),
        });
    }
    let required = settings.min_observations.max(2);
    let periods = frequency.periods_per_year();

    let series: Vec<&ReturnSeries> = tickers
        .iter()
        .map(|t| {
            history.get(t).ok_or_else(|| MeridianError::DataInsufficient {
                asset: t.clone(),
                required,
                available: 0,
            })
        })
        .collect::<MeridianResult<_>>()?;

    let mut values = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        let own = series[i].values();
        if own.len() < required {
            return Err(MeridianError::DataInsufficient {
                asset: tickers[i].clone(),
                required,
                available: own.len(),
            });
        }
        values[i][i] = sample_covariance(&own, &own).unwrap_or(Decimal::ZERO) * periods;

        for j in (i + 1)..n {
            let (xs, ys) = series[i].overlap(series[j]);
            if xs.len() < required {
                return Err(MeridianError::DataInsufficient {
                    asset: format!("{}/{}", tickers[i], tickers[j]),
                    required,
                    available: xs.len(),
                });
            }
            let cov = sample_covariance(&xs, &ys).unwrap_or(Decimal::ZERO) * periods;
            values[i][j] = cov;
            values[j][i] = cov;
        }
    }

    let intensity = match settings.shrinkage {
        ShrinkageIntensity::Fixed(intensity) => intensity,
        ShrinkageIntensity::LedoitWolf => {
            let common = common_columns(&series);
            let shared = common.first().map_or(0, Vec::len);
            if shared < required {
                tracing::warn!(shared, required, "too few shared dates for Ledoit-Wolf, covariance left unshrunk");
                Decimal::ZERO
            } else {
                ledoit_wolf_intensity(&common)
            }
        }
    };

    tracing::debug!(assets = n, min_observations = required, %intensity, "estimated pairwise covariance");
    CovarianceMatrix::finalize(tickers.to_vec(), values, intensity, settings)
}

/// Returns of every series on the dates all of them share, one column each.
fn common_columns(series: &[&ReturnSeries]) -> Vec<Vec<Decimal>> {
    let Some((first, rest)) = series.split_first() else {
        return Vec::new();
    };
    let shared: Vec<_> = first
        .dates()
        .filter(|d| rest.iter().all(|s| s.observations.contains_key(*d)))
        .copied()
        .collect();
    series
        .iter()
        .map(|s| shared.iter().filter_map(|d| s.observations.get(d).copied()).collect())
        .collect()
}
