use serde_json::Value;

use meridian_core::catalog::default_universe;
use meridian_core::expected_returns::ConsensusTable;

/// Built-in long-term capital market assumptions and the default ETF universe.
pub fn run_assumptions() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::json!({
        "result": {
            "consensus": ConsensusTable::long_term_defaults(),
            "default_universe": default_universe(),
        }
    }))
}
