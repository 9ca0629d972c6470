use chrono::{Days, NaiveDate};
use meridian_core::engine::{compute_estimates, OptimizationSettings};
use meridian_core::expected_returns::{CapmParameters, ConsensusTable};
use meridian_core::{
    Asset, CovarianceSettings, DiversificationCaps, Engine, EstimationWindow, InMemoryPriceHistory, MeridianError,
    MeridianResult, OptimizationRequest, Preference, PriceHistoryProvider, PriceSeries, ReturnFrequency, ReturnModel,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Days::new(n)
}

/// Price path following `returns`, first price on `day(start)`.
fn path(ticker: &str, start: u64, returns: &[Decimal]) -> PriceSeries {
    let mut price = dec!(50);
    let mut points = vec![(day(start), price)];
    for (k, r) in returns.iter().enumerate() {
        price *= Decimal::ONE + *r;
        points.push((day(start + k as u64 + 1), price));
    }
    PriceSeries::new(ticker, points)
}

/// 24 returns from a fixed repeating pattern, scaled and shifted per asset.
fn pattern(scale: Decimal, shift: usize) -> Vec<Decimal> {
    let base = [
        dec!(0.010),
        dec!(-0.004),
        dec!(0.006),
        dec!(-0.012),
        dec!(0.003),
        dec!(0.008),
        dec!(-0.007),
        dec!(0.002),
    ];
    (0..24).map(|k| base[(k + shift) % base.len()] * scale).collect()
}

fn window(days: u64) -> EstimationWindow {
    EstimationWindow {
        start: day(0),
        end: day(days),
        frequency: ReturnFrequency::Daily,
        lookback_periods: None,
    }
}

fn covariance_settings() -> CovarianceSettings {
    CovarianceSettings {
        min_observations: 12,
        ..CovarianceSettings::default()
    }
}

fn request(universe: Vec<Asset>, model: ReturnModel, cap: Decimal) -> OptimizationRequest {
    OptimizationRequest {
        universe,
        preference: Preference::RiskTolerance(dec!(0.5)),
        model,
        caps: DiversificationCaps::uniform(cap),
        window: window(40),
        covariance: covariance_settings(),
        settings: OptimizationSettings {
            frontier_points: 10,
            ..OptimizationSettings::default()
        },
    }
}

struct CountingProvider {
    inner: InMemoryPriceHistory,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(series: Vec<PriceSeries>) -> Self {
        Self {
            inner: InMemoryPriceHistory::new(series),
            calls: AtomicUsize::new(0),
        }
    }
}

impl PriceHistoryProvider for CountingProvider {
    fn price_series(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> MeridianResult<HashMap<String, PriceSeries>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.inner.price_series(tickers, start, end)
    }
}

struct UnreachableProvider;

impl PriceHistoryProvider for UnreachableProvider {
    fn price_series(&self, _: &[String], _: NaiveDate, _: NaiveDate) -> MeridianResult<HashMap<String, PriceSeries>> {
        panic!("price history must not be requested");
    }
}

// ---------------------------------------------------------------------------
// Single-asset universe
// ---------------------------------------------------------------------------

#[test]
fn test_single_asset_consensus_gets_full_weight() {
    let engine = Engine::new(InMemoryPriceHistory::new(vec![path("GLD", 0, &pattern(dec!(1), 0))]));
    let req = request(
        vec![Asset::new("GLD", "gold", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(1),
    );
    let out = engine.optimize(&req).unwrap();
    assert_eq!(out.result.selected.weights, vec![Decimal::ONE]);
    assert_eq!(out.result.expected_return, dec!(0.0678));
}

#[test]
fn test_single_asset_capm_gets_full_weight() {
    let engine = Engine::new(InMemoryPriceHistory::new(vec![
        path("GLD", 0, &pattern(dec!(0.8), 3)),
        path("IDX", 0, &pattern(dec!(1), 0)),
    ]));
    let req = request(
        vec![Asset::new("GLD", "gold", "global")],
        ReturnModel::HistoricalCapm(CapmParameters::new("IDX", dec!(0.02))),
        dec!(1),
    );
    let out = engine.optimize(&req).unwrap();
    assert_eq!(out.result.selected.weights, vec![Decimal::ONE]);
}

// ---------------------------------------------------------------------------
// Failure ordering
// ---------------------------------------------------------------------------

#[test]
fn test_infeasible_caps_never_touch_data() {
    let engine = Engine::new(UnreachableProvider);
    let req = request(
        vec![Asset::new("A", "gold", "global"), Asset::new("B", "gold", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(0.25),
    );
    match engine.optimize(&req) {
        Err(MeridianError::InfeasibleConstraint { shortfall, .. }) => assert_eq!(shortfall, dec!(0.5)),
        other => panic!("Expected InfeasibleConstraint, got {:?}", other.map(|o| o.result)),
    }
}

#[test]
fn test_unmapped_asset_class_fails_before_data_fetch() {
    let engine = Engine::new(UnreachableProvider);
    let req = request(
        vec![Asset::new("A", "gold", "global"), Asset::new("B", "crypto", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(1),
    );
    match engine.optimize(&req) {
        Err(MeridianError::MissingAssetMapping { asset, asset_class }) => {
            assert_eq!(asset, "B");
            assert_eq!(asset_class, "crypto");
        }
        other => panic!("Expected MissingAssetMapping, got {:?}", other.map(|o| o.result)),
    }
}

#[test]
fn test_short_history_is_insufficient() {
    let short: Vec<Decimal> = pattern(dec!(1), 0).into_iter().take(5).collect();
    let engine = Engine::new(InMemoryPriceHistory::new(vec![path("A", 0, &short)]));
    let req = request(
        vec![Asset::new("A", "gold", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(1),
    );
    match engine.optimize(&req) {
        Err(MeridianError::DataInsufficient { asset, required, available }) => {
            assert_eq!(asset, "A");
            assert_eq!(required, 12);
            assert_eq!(available, 5);
        }
        other => panic!("Expected DataInsufficient, got {:?}", other.map(|o| o.result)),
    }
}

// ---------------------------------------------------------------------------
// Estimation on imperfect data
// ---------------------------------------------------------------------------

#[test]
fn test_collinear_and_late_starting_assets_still_optimise() {
    // B is A levered 2x; C starts eight days late
    let a = pattern(dec!(1), 0);
    let b: Vec<Decimal> = a.iter().map(|r| *r * dec!(2)).collect();
    let c: Vec<Decimal> = pattern(dec!(0.5), 5).into_iter().take(16).collect();
    let provider = InMemoryPriceHistory::new(vec![path("A", 0, &a), path("B", 0, &b), path("C", 8, &c)]);
    let universe = vec![
        Asset::new("A", "us_large_cap", "us"),
        Asset::new("B", "us_small_cap", "us"),
        Asset::new("C", "euro_government_bonds", "europe"),
    ];
    let model = ReturnModel::Consensus(ConsensusTable::long_term_defaults());

    let estimates = compute_estimates(&provider, &universe, &model, &window(40), &covariance_settings()).unwrap();
    assert!(estimates.covariance.is_symmetric());
    assert!(estimates.covariance.is_positive_semidefinite(dec!(0.000000000001)));
    assert_eq!(estimates.observations, 24);
    // Ledoit-Wolf over the 16 dates all three share
    assert!(estimates.shrinkage_intensity > Decimal::ZERO);
    assert!(estimates.shrinkage_intensity <= Decimal::ONE);

    let engine = Engine::new(provider);
    let out = engine.optimize(&request(universe, model, dec!(0.6))).unwrap();
    let total: Decimal = out.result.selected.weights.iter().sum();
    assert_eq!(total, Decimal::ONE);
    assert!(out.result.selected.weights.iter().all(|w| *w >= Decimal::ZERO && *w <= dec!(0.6)));
}

#[test]
fn test_lookback_trims_window_calendar() {
    let provider = InMemoryPriceHistory::new(vec![path("A", 0, &pattern(dec!(1), 0))]);
    let universe = vec![Asset::new("A", "gold", "global")];
    let model = ReturnModel::Consensus(ConsensusTable::long_term_defaults());
    let mut win = window(40);
    win.lookback_periods = Some(15);

    let estimates = compute_estimates(&provider, &universe, &model, &win, &covariance_settings()).unwrap();
    assert_eq!(estimates.observations, 15);
    assert_eq!(estimates.last_date, Some(day(24)));
    assert_eq!(estimates.first_date, Some(day(10)));
}

// ---------------------------------------------------------------------------
// Memoisation
// ---------------------------------------------------------------------------

#[cfg(feature = "cache")]
#[test]
fn test_concurrent_identical_requests_share_one_estimation() {
    let engine = Engine::new(CountingProvider::new(vec![
        path("A", 0, &pattern(dec!(1), 0)),
        path("B", 0, &pattern(dec!(0.6), 3)),
    ]));
    let req = request(
        vec![Asset::new("A", "us_large_cap", "us"), Asset::new("B", "gold", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(0.7),
    );

    let results: Vec<Vec<Decimal>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| engine.optimize(&req).unwrap().result.selected.weights))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(engine.provider().calls.load(Ordering::SeqCst), 1);
    for weights in &results[1..] {
        assert_eq!(weights, &results[0]);
    }
}

#[cfg(feature = "cache")]
#[test]
fn test_different_windows_are_estimated_separately() {
    let engine = Engine::new(CountingProvider::new(vec![path("A", 0, &pattern(dec!(1), 0))]));
    let mut req = request(
        vec![Asset::new("A", "gold", "global")],
        ReturnModel::Consensus(ConsensusTable::long_term_defaults()),
        dec!(1),
    );
    engine.optimize(&req).unwrap();
    req.window.lookback_periods = Some(20);
    engine.optimize(&req).unwrap();
    assert_eq!(engine.provider().calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.cache().len(), 2);
}
