//! Risk model: annualised covariance of asset returns.
//!
//! Covers:
//! 1. **Pairwise sample covariance** -- each entry estimated from the dates
//!    the pair actually shares (see [`covariance`]).
//! 2. **Shrinkage** -- Ledoit-Wolf (or fixed) intensity toward the diagonal,
//!    then LDL' validation and deterministic repair shrinkage when validation
//!    still fails (see [`shrinkage`]).
//! 3. **Correlation** -- derived element-wise from the covariance.

pub mod covariance;
pub mod shrinkage;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::MeridianError;
use crate::math::{is_positive_semidefinite, sqrt_decimal};
use crate::types::Diagnostic;
use crate::MeridianResult;

pub use covariance::estimate_covariance;

fn default_min_observations() -> usize {
    12
}

fn default_psd_tolerance() -> Decimal {
    dec!(0.000000000001)
}

fn default_symmetry_tolerance() -> Decimal {
    dec!(0.0000001)
}

/// How much of the sample covariance is blended toward its diagonal before
/// PSD validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ShrinkageIntensity {
    /// Estimated from the returns over the dates every asset shares.
    /// Caller-supplied matrices carry no returns and are left unshrunk.
    #[default]
    LedoitWolf,
    /// Fixed intensity in [0, 1].
    Fixed(Decimal),
}

/// Fixed estimator knobs. Passed explicitly with every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CovarianceSettings {
    /// Minimum return observations per asset and per asset pair.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default)]
    pub shrinkage: ShrinkageIntensity,
    /// Relative tolerance of the PSD test.
    #[serde(default = "default_psd_tolerance")]
    pub psd_tolerance: Decimal,
    /// Absolute tolerance when admitting a caller-supplied matrix.
    #[serde(default = "default_symmetry_tolerance")]
    pub symmetry_tolerance: Decimal,
}

impl Default for CovarianceSettings {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            shrinkage: ShrinkageIntensity::default(),
            psd_tolerance: default_psd_tolerance(),
            symmetry_tolerance: default_symmetry_tolerance(),
        }
    }
}

/// Symmetric, positive semi-definite, annualised covariance matrix with a
/// strictly positive diagonal. Only constructed through validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovarianceMatrix {
    tickers: Vec<String>,
    values: Vec<Vec<Decimal>>,
}

/// Covariance plus the non-fatal events raised while producing it.
#[derive(Debug, Clone, Serialize)]
pub struct CovarianceEstimate {
    pub matrix: CovarianceMatrix,
    pub diagnostics: Vec<Diagnostic>,
    /// Intensity blended toward the diagonal before PSD validation.
    pub shrinkage_intensity: Decimal,
}

impl CovarianceMatrix {
    /// Admit a caller-supplied matrix: square, symmetric within tolerance,
    /// positive diagonal; repaired by shrinkage when not PSD.
    pub fn from_supplied(
        tickers: Vec<String>,
        values: Vec<Vec<Decimal>>,
        settings: &CovarianceSettings,
    ) -> MeridianResult<CovarianceEstimate> {
        let n = tickers.len();
        if n == 0 {
            return Err(MeridianError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: "At least one asset required".into(),
            });
        }
        if values.len() != n {
            return Err(MeridianError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Expected {}x{} matrix but got {} rows", n, n, values.len()),
            });
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != n {
                return Err(MeridianError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
                });
            }
        }
        let mut sym = values;
        for i in 0..n {
            for j in (i + 1)..n {
                if (sym[i][j] - sym[j][i]).abs() > settings.symmetry_tolerance {
                    return Err(MeridianError::InvalidInput {
                        field: "covariance_matrix".into(),
                        reason: format!(
                            "Not symmetric: [{},{}]={} != [{},{}]={}",
                            i, j, sym[i][j], j, i, sym[j][i]
                        ),
                    });
                }
                // Average away sub-tolerance asymmetry so the stored matrix is exact.
                let avg = (sym[i][j] + sym[j][i]) / dec!(2);
                sym[i][j] = avg;
                sym[j][i] = avg;
            }
        }
        let intensity = match settings.shrinkage {
            ShrinkageIntensity::Fixed(intensity) => intensity,
            ShrinkageIntensity::LedoitWolf => Decimal::ZERO,
        };
        Self::finalize(tickers, sym, intensity, settings)
    }

    /// Shared tail of estimation and admission: diagonal check, shrinkage
    /// at `intensity`, PSD enforcement.
    pub(crate) fn finalize(
        tickers: Vec<String>,
        values: Vec<Vec<Decimal>>,
        intensity: Decimal,
        settings: &CovarianceSettings,
    ) -> MeridianResult<CovarianceEstimate> {
        for (i, ticker) in tickers.iter().enumerate() {
            if values[i][i] <= Decimal::ZERO {
                return Err(MeridianError::InvalidInput {
                    field: format!("covariance_matrix[{}]", ticker),
                    reason: format!("Variance must be strictly positive, got {}", values[i][i]),
                });
            }
        }

        if intensity < Decimal::ZERO || intensity > Decimal::ONE {
            return Err(MeridianError::InvalidInput {
                field: "shrinkage".into(),
                reason: format!("Shrinkage intensity must lie in [0, 1], got {}", intensity),
            });
        }
        let mut values = values;
        if intensity > Decimal::ZERO {
            values = shrinkage::shrink_toward_diagonal(&values, intensity);
            tracing::debug!(%intensity, "shrunk covariance toward its diagonal");
        }

        let mut diagnostics = Vec::new();
        let (values, event) = shrinkage::enforce_psd(values, settings.psd_tolerance);
        if let Some(event) = event {
            tracing::warn!("{}", event.describe());
            diagnostics.push(event);
        }

        Ok(CovarianceEstimate {
            matrix: CovarianceMatrix { tickers, values },
            diagnostics,
            shrinkage_intensity: intensity,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[Vec<Decimal>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Decimal {
        self.values[i][j]
    }

    pub fn volatilities(&self) -> Vec<Decimal> {
        (0..self.len()).map(|i| sqrt_decimal(self.values[i][i])).collect()
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| ((i + 1)..n).all(|j| self.values[i][j] == self.values[j][i]))
    }

    pub fn is_positive_semidefinite(&self, tolerance: Decimal) -> bool {
        is_positive_semidefinite(&self.values, tolerance)
    }

    /// corr[i][j] = cov[i][j] / sqrt(cov[i][i] * cov[j][j])
    pub fn correlation(&self) -> Vec<Vec<Decimal>> {
        let n = self.len();
        let vols = self.volatilities();
        let mut corr = vec![vec![Decimal::ZERO; n]; n];
        for i in 0..n {
            corr[i][i] = Decimal::ONE;
            for j in (i + 1)..n {
                let denom = vols[i] * vols[j];
                let c = if denom.is_zero() {
                    Decimal::ZERO
                } else {
                    self.values[i][j] / denom
                };
                corr[i][j] = c;
                corr[j][i] = c;
            }
        }
        corr
    }
}
