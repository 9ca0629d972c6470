use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::MeridianError;
use crate::types::PriceSeries;
use crate::MeridianResult;

/// Simple periodic returns of one asset, keyed by the date of the later
/// observation. A return spanning a data gap is kept as one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub ticker: String,
    pub observations: BTreeMap<NaiveDate, Decimal>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.observations.values().copied().collect()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.observations.keys()
    }

    /// Keep only observations dated on the calendar.
    pub fn restrict_to(&self, calendar: &BTreeSet<NaiveDate>) -> ReturnSeries {
        ReturnSeries {
            ticker: self.ticker.clone(),
            observations: self
                .observations
                .iter()
                .filter(|(d, _)| calendar.contains(d))
                .map(|(d, r)| (*d, *r))
                .collect(),
        }
    }

    /// Observations both series share, aligned by date.
    pub fn overlap(&self, other: &ReturnSeries) -> (Vec<Decimal>, Vec<Decimal>) {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (date, x) in &self.observations {
            if let Some(y) = other.observations.get(date) {
                xs.push(*x);
                ys.push(*y);
            }
        }
        (xs, ys)
    }
}

/// Convert an ordered price series into simple returns.
pub fn periodic_returns(series: &PriceSeries) -> MeridianResult<ReturnSeries> {
    let mut observations = BTreeMap::new();
    for (i, point) in series.points.iter().enumerate() {
        if point.price <= Decimal::ZERO {
            return Err(MeridianError::InvalidInput {
                field: format!("price_series[{}]", series.ticker),
                reason: format!("Non-positive price {} on {}", point.price, point.date),
            });
        }
        if i == 0 {
            continue;
        }
        let prev = &series.points[i - 1];
        if point.date <= prev.date {
            return Err(MeridianError::InvalidInput {
                field: format!("price_series[{}]", series.ticker),
                reason: format!(
                    "Dates must be strictly ascending: {} follows {}",
                    point.date, prev.date
                ),
            });
        }
        observations.insert(point.date, point.price / prev.price - Decimal::ONE);
    }
    Ok(ReturnSeries {
        ticker: series.ticker.clone(),
        observations,
    })
}

/// Union of the return dates of every series, trimmed to the most recent
/// `lookback` dates when given.
pub fn window_calendar(series: &[&ReturnSeries], lookback: Option<usize>) -> BTreeSet<NaiveDate> {
    let all: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.observations.keys().copied())
        .collect();
    match lookback {
        Some(n) if n < all.len() => all.into_iter().rev().take(n).collect(),
        _ => all,
    }
}

pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as i64)
}

/// Sample covariance (n - 1 denominator) of two aligned samples.
pub fn sample_covariance(xs: &[Decimal], ys: &[Decimal]) -> Option<Decimal> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let sum: Decimal = xs
        .iter()
        .zip(ys.iter())
        .map(|(x, y)| (*x - mx) * (*y - my))
        .sum();
    Some(sum / Decimal::from((n - 1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_returns_dated_at_later_observation() {
        let series = PriceSeries::new("A", vec![(d(1), dec!(100)), (d(2), dec!(110)), (d(5), dec!(99))]);
        let r = periodic_returns(&series).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.observations[&d(2)], dec!(0.1));
        // Gap from the 2nd to the 5th is one observation
        assert_eq!(r.observations[&d(5)], dec!(-0.1));
    }

    #[test]
    fn test_non_ascending_dates_rejected() {
        let series = PriceSeries::new("A", vec![(d(2), dec!(100)), (d(1), dec!(101))]);
        assert!(periodic_returns(&series).is_err());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let series = PriceSeries::new("A", vec![(d(1), dec!(100)), (d(2), dec!(0))]);
        assert!(periodic_returns(&series).is_err());
    }

    #[test]
    fn test_window_calendar_lookback() {
        let a = periodic_returns(&PriceSeries::new(
            "A",
            vec![(d(1), dec!(1)), (d(2), dec!(1)), (d(3), dec!(1)), (d(4), dec!(1))],
        ))
        .unwrap();
        let b = periodic_returns(&PriceSeries::new(
            "B",
            vec![(d(4), dec!(1)), (d(5), dec!(1))],
        ))
        .unwrap();
        let cal = window_calendar(&[&a, &b], Some(2));
        assert_eq!(cal.into_iter().collect::<Vec<_>>(), vec![d(4), d(5)]);
    }

    #[test]
    fn test_sample_covariance() {
        let xs = [dec!(1), dec!(2), dec!(3)];
        let ys = [dec!(2), dec!(4), dec!(6)];
        assert_eq!(sample_covariance(&xs, &ys), Some(dec!(2)));
        assert_eq!(sample_covariance(&xs[..1], &ys[..1]), None);
    }
}
