use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Portfolio weights expressed as decimals (0.25 = 25% of capital).
pub type Weight = Decimal;

/// Asset reference data. Owned by the external data layer; never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub asset_class: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Asset {
    pub fn new(ticker: &str, asset_class: &str, region: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            asset_class: asset_class.to_string(),
            region: region.to_string(),
            name: None,
        }
    }
}

/// A single adjusted close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Ordered price history for one asset. May have gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: &str, points: Vec<(NaiveDate, Decimal)>) -> Self {
        Self {
            ticker: ticker.to_string(),
            points: points
                .into_iter()
                .map(|(date, price)| PricePoint { date, price })
                .collect(),
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Frequency of return observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> Decimal {
        match self {
            ReturnFrequency::Daily => dec!(252),
            ReturnFrequency::Weekly => dec!(52),
            ReturnFrequency::Monthly => dec!(12),
            ReturnFrequency::Quarterly => dec!(4),
            ReturnFrequency::Annual => dec!(1),
        }
    }
}

/// Trailing window over which returns and risk are estimated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EstimationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    /// Keep only the most recent N return dates of the window calendar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_periods: Option<usize>,
}

/// Non-fatal conditions raised while computing a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Sample covariance was not PSD and was blended toward its diagonal.
    CovarianceShrunk { intensity: Decimal, target: String },
    /// A frontier point broke volatility monotonicity and was discarded.
    FrontierPointDropped {
        target_return: Rate,
        volatility: Rate,
        previous_volatility: Rate,
    },
    /// Requested volatility lies outside the frontier; max Sharpe was used.
    TargetVolatilityUnreachable {
        target_volatility: Rate,
        min_volatility: Rate,
        max_volatility: Rate,
    },
}

impl Diagnostic {
    pub fn describe(&self) -> String {
        match self {
            Diagnostic::CovarianceShrunk { intensity, target } => format!(
                "Covariance matrix was not positive semi-definite; shrunk toward {} target with intensity {}",
                target, intensity
            ),
            Diagnostic::FrontierPointDropped {
                target_return,
                volatility,
                previous_volatility,
            } => format!(
                "Dropped frontier point at target return {:.6}: volatility {:.6} below previous {:.6}",
                target_return, volatility, previous_volatility
            ),
            Diagnostic::TargetVolatilityUnreachable {
                target_volatility,
                min_volatility,
                max_volatility,
            } => format!(
                "Target volatility {:.4} outside frontier range [{:.4}, {:.4}]; defaulted to max Sharpe",
                target_volatility, min_volatility, max_volatility
            ),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
