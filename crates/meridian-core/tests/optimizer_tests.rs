use meridian_core::allocation::dollar_allocation;
use meridian_core::engine::OptimizationSettings;
use meridian_core::frontier::{generate_frontier, solve, Objective};
use meridian_core::{
    optimize_supplied, optimize_with_estimates, ConstraintBuilder, CovarianceMatrix, CovarianceSettings,
    MeridianError, Preference, ReturnVector, SolverSettings,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn tickers(n: usize) -> Vec<String> {
    ["EQ", "BND", "EM", "CASH", "E", "F"][..n].iter().map(|s| s.to_string()).collect()
}

/// Four assets, positive definite covariance.
fn four_asset_case() -> (ReturnVector, CovarianceMatrix) {
    let t = tickers(4);
    let mu = ReturnVector::from_values(t.clone(), vec![dec!(0.07), dec!(0.05), dec!(0.09), dec!(0.04)]).unwrap();
    let cov = CovarianceMatrix::from_supplied(
        t,
        vec![
            vec![dec!(0.0400), dec!(0.0060), dec!(0.0120), dec!(0.0010)],
            vec![dec!(0.0060), dec!(0.0100), dec!(0.0040), dec!(0.0005)],
            vec![dec!(0.0120), dec!(0.0040), dec!(0.0625), dec!(0.0015)],
            vec![dec!(0.0010), dec!(0.0005), dec!(0.0015), dec!(0.0025)],
        ],
        &CovarianceSettings::default(),
    )
    .unwrap()
    .matrix;
    (mu, cov)
}

fn assert_valid_weights(weights: &[Decimal], cap: Decimal) {
    let total: Decimal = weights.iter().sum();
    assert!((total - Decimal::ONE).abs() <= dec!(0.000001), "weights sum to {}", total);
    for w in weights {
        assert!(*w >= Decimal::ZERO && *w <= cap, "weight {} outside [0, {}]", w, cap);
    }
}

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

#[test]
fn test_four_asset_end_to_end_is_deterministic() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let settings = OptimizationSettings::default();

    let first = optimize_with_estimates(&mu, &cov, &cons, Preference::RiskTolerance(dec!(0.5)), &settings).unwrap();
    let second = optimize_with_estimates(&mu, &cov, &cons, Preference::RiskTolerance(dec!(0.5)), &settings).unwrap();

    assert_eq!(first.selected.weights, second.selected.weights);
    assert_valid_weights(&first.selected.weights, dec!(0.40));
    assert!(first.expected_return >= first.min_variance.expected_return);
    assert!(first.expected_return <= first.max_return.expected_return);
    assert_eq!(first.allocations.len(), 4);
}

#[test]
fn test_every_frontier_point_is_feasible() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let frontier = generate_frontier(mu.as_slice(), cov.rows(), &cons, dec!(0.02), 25, &SolverSettings::default()).unwrap();
    assert!(frontier.points.len() > 2);
    for point in &frontier.points {
        assert_valid_weights(&point.weights, dec!(0.40));
        assert_eq!(point.weights.iter().sum::<Decimal>(), Decimal::ONE);
    }
}

#[test]
fn test_frontier_volatility_non_decreasing() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let frontier = generate_frontier(mu.as_slice(), cov.rows(), &cons, dec!(0.02), 40, &SolverSettings::default()).unwrap();
    for pair in frontier.points.windows(2) {
        assert!(
            pair[1].volatility >= pair[0].volatility,
            "volatility fell from {} to {}",
            pair[0].volatility,
            pair[1].volatility
        );
        assert!(pair[1].target_return > pair[0].target_return);
    }
}

#[test]
fn test_max_return_point_respects_cap() {
    // Greedy fill: EM 0.40, EQ 0.40, BND 0.20
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let w = solve(Objective::MaxReturn, mu.as_slice(), cov.rows(), &cons, &SolverSettings::default()).unwrap();
    assert_eq!(w, vec![dec!(0.40), dec!(0.20), dec!(0.40), dec!(0)]);
}

// ---------------------------------------------------------------------------
// Structural properties
// ---------------------------------------------------------------------------

#[test]
fn test_symmetric_assets_get_equal_weight() {
    let t = tickers(4);
    let mu = ReturnVector::from_values(t.clone(), vec![dec!(0.06); 4]).unwrap();
    let diag: Vec<Vec<Decimal>> = (0..4)
        .map(|i| (0..4).map(|j| if i == j { dec!(0.04) } else { Decimal::ZERO }).collect())
        .collect();
    let cov = CovarianceMatrix::from_supplied(t.clone(), diag, &CovarianceSettings::default())
        .unwrap()
        .matrix;
    let cons = ConstraintBuilder::new(&t, dec!(0.5)).build().unwrap();

    let result = optimize_with_estimates(&mu, &cov, &cons, Preference::RiskTolerance(dec!(0)), &OptimizationSettings::default())
        .unwrap();
    for w in &result.selected.weights {
        assert!((*w - dec!(0.25)).abs() < dec!(0.000000001), "expected 0.25, got {}", w);
    }
}

#[test]
fn test_two_assets_quarter_cap_is_infeasible() {
    match ConstraintBuilder::new(&tickers(2), dec!(0.25)).build() {
        Err(MeridianError::InfeasibleConstraint { shortfall, .. }) => assert_eq!(shortfall, dec!(0.50)),
        other => panic!("Expected InfeasibleConstraint, got {:?}", other),
    }
}

#[test]
fn test_supplied_non_psd_matrix_is_repaired() {
    let input = serde_json::json!({
        "tickers": ["A", "B", "C"],
        "expected_returns": ["0.05", "0.07", "0.06"],
        "covariance_matrix": [
            ["0.04", "0.038", "-0.03"],
            ["0.038", "0.04", "0.035"],
            ["-0.03", "0.035", "0.04"]
        ],
        "caps": {"max_weight": "0.6"},
        "preference": {"kind": "max_sharpe"}
    });
    let input = serde_json::from_value(input).unwrap();
    let out = optimize_supplied(&input).unwrap();
    assert!(!out.warnings.is_empty());
    assert_valid_weights(&out.result.selected.weights, dec!(0.6));
    for (i, row) in out.result.correlation_matrix.iter().enumerate() {
        assert_eq!(row[i], Decimal::ONE);
    }
}

#[test]
fn test_solver_failure_surfaces_as_non_convergence() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let settings = OptimizationSettings {
        solver: SolverSettings {
            max_iterations: 1,
            max_attempts: 2,
            ..SolverSettings::default()
        },
        ..OptimizationSettings::default()
    };
    let result = optimize_with_estimates(&mu, &cov, &cons, Preference::MaxSharpe, &settings);
    match result {
        Err(MeridianError::NonConvergence { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("Expected NonConvergence, got {:?}", other),
    }
}

#[test]
fn test_dollar_allocation_adds_up() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let result = optimize_with_estimates(&mu, &cov, &cons, Preference::RiskScore(5), &OptimizationSettings::default()).unwrap();
    let split = dollar_allocation(&result, dec!(10000)).unwrap();
    assert_eq!(split.iter().map(|a| a.amount).sum::<Decimal>(), dec!(10000));
    assert!(dollar_allocation(&result, dec!(-5)).is_err());
}

#[test]
fn test_target_volatility_met_between_sweep_points() {
    let (mu, cov) = four_asset_case();
    let cons = ConstraintBuilder::new(&tickers(4), dec!(0.40)).build().unwrap();
    let settings = OptimizationSettings {
        frontier_points: 5,
        ..OptimizationSettings::default()
    };
    let target = dec!(0.10);
    let result = optimize_with_estimates(&mu, &cov, &cons, Preference::TargetVolatility(target), &settings).unwrap();

    assert!(result.volatility <= target);
    assert!(target - result.volatility < dec!(0.000001), "volatility {}", result.volatility);
    assert_valid_weights(&result.selected.weights, dec!(0.40));
    for point in result.efficient_frontier.iter().filter(|p| p.volatility <= target) {
        assert!(result.expected_return >= point.expected_return);
    }
    assert!(result.diagnostics.is_empty());
}
