use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::MeridianError;
use crate::market_data::returns::{mean, sample_covariance};
use crate::market_data::ReturnSeries;
use crate::types::{Asset, Rate, ReturnFrequency};
use crate::MeridianResult;

fn default_min_observations() -> usize {
    12
}

/// Parameters of the trailing-history CAPM model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapmParameters {
    /// Ticker of the market index series.
    pub market_index: String,
    /// Annual risk-free rate.
    pub risk_free_rate: Rate,
    /// Fixed annual market risk premium. When absent, the historical
    /// annualised mean market return over the window minus the risk-free
    /// rate is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_risk_premium: Option<Rate>,
    /// Minimum overlapping observations between an asset and the market.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
}

impl CapmParameters {
    pub fn new(market_index: &str, risk_free_rate: Rate) -> Self {
        Self {
            market_index: market_index.to_string(),
            risk_free_rate,
            market_risk_premium: None,
            min_observations: default_min_observations(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapmEstimate {
    pub beta: Decimal,
    pub expected_return: Rate,
}

/// E[r_i] = rf + beta_i * (E[r_m] - rf), with beta from excess-return regression.
pub fn capm_expected_returns(
    params: &CapmParameters,
    universe: &[Asset],
    history: &HashMap<String, ReturnSeries>,
    frequency: ReturnFrequency,
) -> MeridianResult<Vec<CapmEstimate>> {
    let required = params.min_observations.max(2);
    let market = history
        .get(&params.market_index)
        .ok_or_else(|| MeridianError::DataInsufficient {
            asset: params.market_index.clone(),
            required,
            available: 0,
        })?;
    if market.len() < required {
        return Err(MeridianError::DataInsufficient {
            asset: params.market_index.clone(),
            required,
            available: market.len(),
        });
    }

    let periods = frequency.periods_per_year();
    let rf = params.risk_free_rate;
    let rf_period = rf / periods;

    let premium = match params.market_risk_premium {
        Some(p) => p,
        None => mean(&market.values()) * periods - rf,
    };

    let mut estimates = Vec::with_capacity(universe.len());
    for asset in universe {
        let series = history
            .get(&asset.ticker)
            .ok_or_else(|| MeridianError::DataInsufficient {
                asset: asset.ticker.clone(),
                required,
                available: 0,
            })?;
        let (asset_returns, market_returns) = series.overlap(market);
        if asset_returns.len() < required {
            return Err(MeridianError::DataInsufficient {
                asset: asset.ticker.clone(),
                required,
                available: asset_returns.len(),
            });
        }

        let excess_asset: Vec<Decimal> = asset_returns.iter().map(|r| *r - rf_period).collect();
        let excess_market: Vec<Decimal> = market_returns.iter().map(|r| *r - rf_period).collect();

        let market_var = sample_covariance(&excess_market, &excess_market).unwrap_or(Decimal::ZERO);
        if market_var <= Decimal::ZERO {
            return Err(MeridianError::InvalidInput {
                field: format!("price_series[{}]", params.market_index),
                reason: format!(
                    "Market returns have zero variance over the dates shared with {}",
                    asset.ticker
                ),
            });
        }
        let cov = sample_covariance(&excess_asset, &excess_market).unwrap_or(Decimal::ZERO);
        let beta = cov / market_var;
        let expected_return = rf + beta * premium;

        tracing::debug!(
            asset = %asset.ticker,
            %beta,
            %expected_return,
            observations = asset_returns.len(),
            "CAPM estimate"
        );
        estimates.push(CapmEstimate {
            beta,
            expected_return,
        });
    }
    Ok(estimates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::periodic_returns;
    use crate::types::PriceSeries;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series_from_returns(ticker: &str, returns: &[Decimal]) -> ReturnSeries {
        let mut price = dec!(100);
        let mut points = vec![(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), price)];
        for (i, r) in returns.iter().enumerate() {
            price *= Decimal::ONE + *r;
            points.push((
                NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Days::new(i as u64),
                price,
            ));
        }
        periodic_returns(&PriceSeries::new(ticker, points)).unwrap()
    }

    fn market_returns() -> Vec<Decimal> {
        vec![
            dec!(0.010), dec!(-0.005), dec!(0.012), dec!(0.003), dec!(-0.008), dec!(0.006),
            dec!(0.002), dec!(-0.004), dec!(0.009), dec!(-0.001), dec!(0.004), dec!(-0.006),
        ]
    }

    fn history_with(asset: ReturnSeries, market: ReturnSeries) -> HashMap<String, ReturnSeries> {
        let mut h = HashMap::new();
        h.insert(asset.ticker.clone(), asset);
        h.insert(market.ticker.clone(), market);
        h
    }

    #[test]
    fn test_levered_asset_has_beta_two() {
        let m = market_returns();
        // Asset excess return = 2 * market excess return
        let rf = dec!(0.0252);
        let rf_p = rf / dec!(252);
        let asset: Vec<Decimal> = m.iter().map(|r| rf_p + dec!(2) * (*r - rf_p)).collect();
        let history = history_with(series_from_returns("LEV", &asset), series_from_returns("MKT", &m));

        let mut params = CapmParameters::new("MKT", rf);
        params.market_risk_premium = Some(dec!(0.05));
        let est = capm_expected_returns(
            &params,
            &[Asset::new("LEV", "equity", "US")],
            &history,
            ReturnFrequency::Daily,
        )
        .unwrap();
        assert!((est[0].beta - dec!(2)).abs() < dec!(0.000001), "beta {}", est[0].beta);
        // 0.0252 + 2 * 0.05
        assert!((est[0].expected_return - dec!(0.1252)).abs() < dec!(0.00001));
    }

    #[test]
    fn test_historical_premium_when_not_fixed() {
        let m = market_returns();
        let history = history_with(series_from_returns("MKT2", &m), series_from_returns("MKT", &m));
        let params = CapmParameters::new("MKT", dec!(0.02));
        let est = capm_expected_returns(
            &params,
            &[Asset::new("MKT2", "equity", "US")],
            &history,
            ReturnFrequency::Daily,
        )
        .unwrap();
        // Beta 1 => expected return equals the annualised market mean
        let expected = mean(&m) * dec!(252);
        assert!((est[0].expected_return - expected).abs() < dec!(0.0001));
    }

    #[test]
    fn test_insufficient_overlap() {
        let m = market_returns();
        let history = history_with(series_from_returns("NEW", &m[..4]), series_from_returns("MKT", &m));
        let params = CapmParameters::new("MKT", dec!(0.02));
        match capm_expected_returns(
            &params,
            &[Asset::new("NEW", "equity", "US")],
            &history,
            ReturnFrequency::Daily,
        ) {
            Err(MeridianError::DataInsufficient {
                asset,
                required,
                available,
            }) => {
                assert_eq!(asset, "NEW");
                assert_eq!(required, 12);
                assert_eq!(available, 4);
            }
            other => panic!("Expected DataInsufficient, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_market_series() {
        let params = CapmParameters::new("MKT", dec!(0.02));
        let err = capm_expected_returns(
            &params,
            &[Asset::new("SPY", "equity", "US")],
            &HashMap::new(),
            ReturnFrequency::Daily,
        );
        assert!(matches!(err, Err(MeridianError::DataInsufficient { .. })));
    }
}
