use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use meridian_core::engine::{EstimateInput, OptimizeInput, SuppliedEstimatesInput};
use meridian_core::{
    compute_estimates, dollar_allocation, optimize_supplied, ComputationOutput, Engine, InMemoryPriceHistory,
    OptimizationResult,
};

use crate::input;

#[derive(Args)]
pub struct OptimizeArgs {
    /// Request plus price history (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,
    /// Split this amount across the selected weights
    #[arg(long)]
    pub amount: Option<Decimal>,
}

#[derive(Args)]
pub struct FrontierArgs {
    /// Tickers, expected returns and covariance matrix (JSON or YAML)
    #[arg(long)]
    pub input: Option<String>,
    #[arg(long)]
    pub amount: Option<Decimal>,
}

#[derive(Args)]
pub struct EstimateArgs {
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let doc: OptimizeInput = input::read_input(args.input.as_deref(), "optimize")?;
    tracing::debug!(series = doc.price_history.len(), "loaded price history");
    let engine = Engine::new(InMemoryPriceHistory::new(doc.price_history));
    let output = engine.optimize(&doc.request)?;
    with_dollar_split(output, args.amount)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let doc: SuppliedEstimatesInput = input::read_input(args.input.as_deref(), "frontier")?;
    let output = optimize_supplied(&doc)?;
    with_dollar_split(output, args.amount)
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let doc: EstimateInput = input::read_input(args.input.as_deref(), "estimate")?;
    let provider = InMemoryPriceHistory::new(doc.price_history);
    let estimates = compute_estimates(&provider, &doc.universe, &doc.model, &doc.window, &doc.covariance)?;
    Ok(serde_json::json!({ "result": estimates }))
}

fn with_dollar_split(
    output: ComputationOutput<OptimizationResult>,
    amount: Option<Decimal>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let split = match amount {
        Some(amount) => Some(dollar_allocation(&output.result, amount)?),
        None => None,
    };
    let mut value = serde_json::to_value(&output)?;
    if let (Some(split), Some(result)) = (split, value.get_mut("result").and_then(Value::as_object_mut)) {
        result.insert("dollar_allocation".into(), serde_json::to_value(split)?);
    }
    Ok(value)
}
