//! Price-history input seam.
//!
//! The engine never fetches or persists market data. Callers hand it a
//! [`PriceHistoryProvider`]; [`InMemoryPriceHistory`] covers the CLI, the
//! bindings and tests, where the series arrive inline with the request.

pub mod returns;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{PricePoint, PriceSeries};
use crate::MeridianResult;

pub use returns::{periodic_returns, window_calendar, ReturnSeries};

/// Source of adjusted price history, keyed by ticker.
///
/// Tickers the provider has no data for are simply absent from the map;
/// the estimators turn that into `DataInsufficient` for the asset.
pub trait PriceHistoryProvider {
    fn price_series(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> MeridianResult<HashMap<String, PriceSeries>>;
}

/// Provider over series supplied up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryPriceHistory {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryPriceHistory {
    pub fn new(series: Vec<PriceSeries>) -> Self {
        Self {
            series: series.into_iter().map(|s| (s.ticker.clone(), s)).collect(),
        }
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.ticker.clone(), series);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl PriceHistoryProvider for InMemoryPriceHistory {
    fn price_series(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> MeridianResult<HashMap<String, PriceSeries>> {
        let mut out = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            if let Some(series) = self.series.get(ticker) {
                let points: Vec<PricePoint> = series
                    .points
                    .iter()
                    .filter(|p| p.date >= start && p.date <= end)
                    .copied()
                    .collect();
                out.insert(
                    ticker.clone(),
                    PriceSeries {
                        ticker: ticker.clone(),
                        points,
                    },
                );
            }
        }
        Ok(out)
    }
}
