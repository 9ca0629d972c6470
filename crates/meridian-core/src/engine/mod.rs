//! Request orchestration.
//!
//! [`Engine`] validates a request, builds its constraint set (failing before
//! any data is touched when the caps are infeasible), obtains estimates
//! through the memoisation boundary, sweeps the frontier and assembles the
//! result. [`optimize_with_estimates`] is the same pipeline for callers
//! that bring their own expected returns and covariance.

#[cfg(feature = "cache")]
pub mod cache;
pub mod request;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::allocation::{assemble_result, OptimizationResult, Preference};
use crate::constraints::{ConstraintBuilder, ConstraintSet};
use crate::error::MeridianError;
use crate::expected_returns::{estimate_expected_returns, ReturnModel, ReturnVector};
use crate::frontier::{generate_frontier, max_return_within_volatility};
use crate::market_data::{periodic_returns, window_calendar, PriceHistoryProvider, ReturnSeries};
use crate::risk_model::{estimate_covariance, CovarianceMatrix, CovarianceSettings};
use crate::types::{with_metadata, Asset, ComputationOutput, Diagnostic, EstimationWindow};
use crate::MeridianResult;

#[cfg(feature = "cache")]
pub use cache::{CacheKey, EstimateCache};
pub use request::{
    EstimateInput, OptimizationRequest, OptimizationSettings, OptimizeInput, SuppliedEstimatesInput,
};

/// Expected returns and covariance for one (universe, model, window).
#[derive(Debug, Clone, Serialize)]
pub struct Estimates {
    pub expected_returns: ReturnVector,
    pub covariance: CovarianceMatrix,
    pub diagnostics: Vec<Diagnostic>,
    /// Weight placed on the diagonal target, in [0, 1].
    pub shrinkage_intensity: Decimal,
    /// Dates in the window calendar.
    pub observations: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub struct Engine<P> {
    provider: P,
    #[cfg(feature = "cache")]
    cache: EstimateCache,
}

impl<P: PriceHistoryProvider> Engine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            #[cfg(feature = "cache")]
            cache: EstimateCache::default(),
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(provider: P, cache: EstimateCache) -> Self {
        Self { provider, cache }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[cfg(feature = "cache")]
    pub fn cache(&self) -> &EstimateCache {
        &self.cache
    }

    /// Estimates for the given inputs, shared with any concurrent or earlier
    /// request for the same inputs.
    pub fn estimates(
        &self,
        universe: &[Asset],
        model: &ReturnModel,
        window: &EstimationWindow,
        settings: &CovarianceSettings,
    ) -> MeridianResult<Arc<Estimates>> {
        #[cfg(feature = "cache")]
        {
            let key = CacheKey::new(universe, model, window, settings)?;
            self.cache.get_or_compute(key, || {
                compute_estimates(&self.provider, universe, model, window, settings)
            })
        }
        #[cfg(not(feature = "cache"))]
        {
            compute_estimates(&self.provider, universe, model, window, settings).map(Arc::new)
        }
    }

    pub fn optimize(&self, request: &OptimizationRequest) -> MeridianResult<ComputationOutput<OptimizationResult>> {
        let start = Instant::now();
        request.validate()?;

        let tickers = request.tickers();
        let constraints = ConstraintBuilder::from_caps(&tickers, &request.caps).build()?;
        tracing::info!(
            assets = tickers.len(),
            model = request.model.label(),
            "optimization request accepted"
        );

        let estimates = self.estimates(&request.universe, &request.model, &request.window, &request.covariance)?;
        let mut result = optimize_with_estimates(
            &estimates.expected_returns,
            &estimates.covariance,
            &constraints,
            request.preference,
            &request.settings,
        )?;

        let mut diagnostics = estimates.diagnostics.clone();
        diagnostics.append(&mut result.diagnostics);
        result.diagnostics = diagnostics;

        let warnings: Vec<String> = result.diagnostics.iter().map(Diagnostic::describe).collect();
        let assumptions = serde_json::json!({
            "model": request.model.label(),
            "assets": tickers.len(),
            "max_weight": request.caps.max_weight.to_string(),
            "risk_free_rate": request.settings.risk_free_rate.to_string(),
            "frontier_points": request.settings.frontier_points,
            "frequency": request.window.frequency,
            "observations": estimates.observations,
            "covariance_policy": "pairwise",
            "shrinkage_intensity": estimates.shrinkage_intensity.to_string(),
        });
        let elapsed = start.elapsed().as_micros() as u64;
        tracing::info!(elapsed_us = elapsed, warnings = warnings.len(), "optimization complete");

        Ok(with_metadata(
            "Mean-Variance Efficient Frontier (active-set QP, pairwise covariance)",
            &assumptions,
            warnings,
            elapsed,
            result,
        ))
    }
}

/// Pure estimation: fetch history, window it, run the return model and the
/// covariance estimator.
pub fn compute_estimates<P: PriceHistoryProvider + ?Sized>(
    provider: &P,
    universe: &[Asset],
    model: &ReturnModel,
    window: &EstimationWindow,
    settings: &CovarianceSettings,
) -> MeridianResult<Estimates> {
    request::validate_universe(universe)?;
    request::validate_window(window)?;
    model.check_universe(universe)?;

    let mut tickers: Vec<String> = universe.iter().map(|a| a.ticker.clone()).collect();
    for aux in model.auxiliary_tickers() {
        if !tickers.contains(&aux) {
            tickers.push(aux);
        }
    }

    let prices = provider.price_series(&tickers, window.start, window.end)?;
    let mut returns: HashMap<String, ReturnSeries> = HashMap::with_capacity(prices.len());
    for ticker in &tickers {
        if let Some(series) = prices.get(ticker) {
            returns.insert(ticker.clone(), periodic_returns(series)?);
        }
    }

    let refs: Vec<&ReturnSeries> = returns.values().collect();
    let calendar: BTreeSet<NaiveDate> = window_calendar(&refs, window.lookback_periods);
    let windowed: HashMap<String, ReturnSeries> = returns
        .iter()
        .map(|(t, s)| (t.clone(), s.restrict_to(&calendar)))
        .collect();
    tracing::debug!(
        series = windowed.len(),
        calendar = calendar.len(),
        "windowed return history"
    );

    let expected_returns = estimate_expected_returns(model, universe, &windowed, window.frequency)?;
    let universe_tickers: Vec<String> = universe.iter().map(|a| a.ticker.clone()).collect();
    let covariance = estimate_covariance(&universe_tickers, &windowed, window.frequency, settings)?;

    Ok(Estimates {
        expected_returns,
        covariance: covariance.matrix,
        diagnostics: covariance.diagnostics,
        shrinkage_intensity: covariance.shrinkage_intensity,
        observations: calendar.len(),
        first_date: calendar.first().copied(),
        last_date: calendar.last().copied(),
    })
}

/// Frontier sweep and selection over caller-supplied estimates.
pub fn optimize_with_estimates(
    expected_returns: &ReturnVector,
    covariance: &CovarianceMatrix,
    constraints: &ConstraintSet,
    preference: Preference,
    settings: &OptimizationSettings,
) -> MeridianResult<OptimizationResult> {
    if expected_returns.tickers != covariance.tickers() || covariance.tickers() != constraints.tickers() {
        return Err(MeridianError::InvalidInput {
            field: "tickers".into(),
            reason: "Expected returns, covariance and constraints must cover the same assets in the same order"
                .into(),
        });
    }
    preference.validate()?;
    settings.solver.validate()?;

    let frontier = generate_frontier(
        expected_returns.as_slice(),
        covariance.rows(),
        constraints,
        settings.risk_free_rate,
        settings.frontier_points,
        &settings.solver,
    )?;
    let refined = preference.volatility_target().and_then(|target| {
        max_return_within_volatility(
            &frontier.points,
            target,
            expected_returns.as_slice(),
            covariance.rows(),
            constraints,
            settings.risk_free_rate,
            &settings.solver,
        )
    });
    assemble_result(
        frontier,
        refined,
        covariance,
        expected_returns,
        preference,
        settings.risk_free_rate,
        Vec::new(),
    )
}

/// Admit a [`SuppliedEstimatesInput`] and optimise it, wrapped in the
/// standard output envelope.
pub fn optimize_supplied(input: &SuppliedEstimatesInput) -> MeridianResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    let constraints = ConstraintBuilder::from_caps(&input.tickers, &input.caps).build()?;
    let returns = ReturnVector::from_values(input.tickers.clone(), input.expected_returns.clone())?;
    let covariance = CovarianceMatrix::from_supplied(
        input.tickers.clone(),
        input.covariance_matrix.clone(),
        &input.covariance,
    )?;

    let mut result = optimize_with_estimates(&returns, &covariance.matrix, &constraints, input.preference, &input.settings)?;
    let mut diagnostics = covariance.diagnostics;
    diagnostics.append(&mut result.diagnostics);
    result.diagnostics = diagnostics;

    let warnings: Vec<String> = result.diagnostics.iter().map(Diagnostic::describe).collect();
    let assumptions = serde_json::json!({
        "model": "supplied",
        "assets": input.tickers.len(),
        "max_weight": input.caps.max_weight.to_string(),
        "risk_free_rate": input.settings.risk_free_rate.to_string(),
        "frontier_points": input.settings.frontier_points,
    });
    Ok(with_metadata(
        "Mean-Variance Efficient Frontier (active-set QP, supplied estimates)",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::DiversificationCaps;
    use crate::expected_returns::ConsensusTable;
    use crate::market_data::InMemoryPriceHistory;
    use crate::types::PriceSeries;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        inner: InMemoryPriceHistory,
        calls: AtomicUsize,
    }

    impl PriceHistoryProvider for CountingProvider {
        fn price_series(
            &self,
            tickers: &[String],
            start: NaiveDate,
            end: NaiveDate,
        ) -> MeridianResult<HashMap<String, PriceSeries>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.price_series(tickers, start, end)
        }
    }

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n)
    }

    /// Deterministic zig-zag prices; `phase` sets the length of the cycle.
    fn series(ticker: &str, amplitude: Decimal, phase: usize) -> PriceSeries {
        let mut price = dec!(100);
        let mut points = vec![(day(0), price)];
        for k in 1..=30u64 {
            let sign = if (k as usize) % (3 + phase) == 0 { dec!(-1) } else { dec!(1) };
            price *= Decimal::ONE + sign * amplitude;
            points.push((day(k), price));
        }
        PriceSeries::new(ticker, points)
    }

    fn request(max_weight: Decimal) -> OptimizationRequest {
        OptimizationRequest {
            universe: vec![
                Asset::new("SPX", "us_large_cap", "us"),
                Asset::new("GOV", "euro_government_bonds", "europe"),
                Asset::new("GLD", "gold", "global"),
            ],
            preference: Preference::RiskTolerance(dec!(0.5)),
            model: ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
            caps: DiversificationCaps::uniform(max_weight),
            window: EstimationWindow {
                start: day(0),
                end: day(30),
                frequency: Default::default(),
                lookback_periods: None,
            },
            covariance: CovarianceSettings {
                min_observations: 10,
                ..CovarianceSettings::default()
            },
            settings: OptimizationSettings {
                frontier_points: 8,
                ..OptimizationSettings::default()
            },
        }
    }

    fn provider() -> CountingProvider {
        CountingProvider {
            inner: InMemoryPriceHistory::new(vec![
                series("SPX", dec!(0.012), 0),
                series("GOV", dec!(0.003), 1),
                series("GLD", dec!(0.008), 2),
            ]),
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_optimize_produces_valid_allocation() {
        let engine = Engine::new(provider());
        let out = engine.optimize(&request(dec!(0.6))).unwrap();
        let total: Decimal = out.result.selected.weights.iter().sum();
        assert_eq!(total, Decimal::ONE);
        assert!(out.result.selected.weights.iter().all(|w| *w >= Decimal::ZERO && *w <= dec!(0.6)));
        assert_eq!(out.result.allocations.len(), 3);
        assert!(out.methodology.contains("Mean-Variance"));
    }

    #[test]
    fn test_infeasible_caps_fail_before_data_fetch() {
        let engine = Engine::new(provider());
        let result = engine.optimize(&request(dec!(0.25)));
        assert!(matches!(result, Err(MeridianError::InfeasibleConstraint { .. })));
        assert_eq!(engine.provider().calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(feature = "cache")]
    #[test]
    fn test_repeated_requests_reuse_estimates() {
        let engine = Engine::new(provider());
        let req = request(dec!(0.6));
        let first = engine.optimize(&req).unwrap();
        let second = engine.optimize(&req).unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(engine.provider().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shrinkage_intensity_reported() {
        let engine = Engine::new(provider());
        let req = request(dec!(0.6));
        let estimates = engine
            .estimates(&req.universe, &req.model, &req.window, &req.covariance)
            .unwrap();
        assert!(estimates.shrinkage_intensity >= Decimal::ZERO);
        assert!(estimates.shrinkage_intensity <= Decimal::ONE);

        let out = engine.optimize(&req).unwrap();
        assert_eq!(
            out.assumptions["shrinkage_intensity"],
            serde_json::json!(estimates.shrinkage_intensity.to_string())
        );
    }

    #[test]
    fn test_mismatched_tickers_rejected() {
        let returns = ReturnVector::from_values(vec!["A".into(), "B".into()], vec![dec!(0.05), dec!(0.06)]).unwrap();
        let cov = CovarianceMatrix::from_supplied(
            vec!["B".into(), "A".into()],
            vec![vec![dec!(0.04), dec!(0)], vec![dec!(0), dec!(0.09)]],
            &CovarianceSettings::default(),
        )
        .unwrap();
        let cons = ConstraintBuilder::new(&["A".to_string(), "B".to_string()], dec!(1)).build().unwrap();
        let result = optimize_with_estimates(&returns, &cov.matrix, &cons, Preference::MaxSharpe, &OptimizationSettings::default());
        assert!(matches!(result, Err(MeridianError::InvalidInput { .. })));
    }
}
