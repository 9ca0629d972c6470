use napi::Result as NapiResult;
use napi_derive::napi;

use meridian_core::engine::{EstimateInput, OptimizeInput, SuppliedEstimatesInput};
use meridian_core::{Engine, InMemoryPriceHistory};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize(input_json: String) -> NapiResult<String> {
    let input: OptimizeInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let engine = Engine::new(InMemoryPriceHistory::new(input.price_history));
    let output = engine.optimize(&input.request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn optimize_with_estimates(input_json: String) -> NapiResult<String> {
    let input: SuppliedEstimatesInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = meridian_core::optimize_supplied(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate(input_json: String) -> NapiResult<String> {
    let input: EstimateInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let provider = InMemoryPriceHistory::new(input.price_history);
    let estimates = meridian_core::compute_estimates(
        &provider,
        &input.universe,
        &input.model,
        &input.window,
        &input.covariance,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&estimates).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[napi]
pub fn default_assumptions() -> NapiResult<String> {
    let output = serde_json::json!({
        "consensus": meridian_core::expected_returns::ConsensusTable::long_term_defaults(),
        "default_universe": meridian_core::catalog::default_universe(),
    });
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn dollar_allocation(result_json: String, amount: String) -> NapiResult<String> {
    let result: meridian_core::OptimizationResult = serde_json::from_str(&result_json).map_err(to_napi_error)?;
    let amount: rust_decimal::Decimal = amount.parse().map_err(to_napi_error)?;
    let split = meridian_core::dollar_allocation(&result, amount).map_err(to_napi_error)?;
    serde_json::to_string(&split).map_err(to_napi_error)
}
