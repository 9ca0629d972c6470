use serde_json::Value;

/// One line per asset: the selected weight for optimization results, the
/// expected return for estimates. Anything else prints its first field.
pub fn render_minimal(value: &Value) -> Vec<String> {
    let result = value.get("result").unwrap_or(value);

    if let Some(Value::Array(allocations)) = result.get("allocations") {
        return allocations
            .iter()
            .map(|a| format!("{}\t{}", scalar(&a["ticker"]), scalar(&a["weight"])))
            .collect();
    }

    if let Some(vector) = result.get("expected_returns") {
        if let (Some(Value::Array(tickers)), Some(Value::Array(values))) = (vector.get("tickers"), vector.get("values")) {
            return tickers
                .iter()
                .zip(values)
                .map(|(t, v)| format!("{}\t{}", scalar(t), scalar(v)))
                .collect();
        }
    }

    match result {
        Value::Object(map) => map
            .iter()
            .next()
            .map(|(key, val)| vec![format!("{}: {}", key, scalar(val))])
            .unwrap_or_default(),
        other => vec![scalar(other)],
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
