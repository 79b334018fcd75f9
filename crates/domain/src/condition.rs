//! Condition evaluation: `(value, operator, threshold) → bool`.
//!
//! Comparison is numeric only. `==` and `!=` use exact floating-point
//! equality with no epsilon: sensor values are expected to be rounded to
//! their reporting precision before they reach the engine.

use serde::{Deserialize, Serialize};

/// A numeric comparison operator, serialized with its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl ComparisonOperator {
    /// Apply the operator to a present value.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => value == threshold,
            Self::NotEqual => value != threshold,
        }
    }

    /// The operator's symbol, e.g. `">="`.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Evaluate a comparison against a possibly missing sensor value.
///
/// A missing value is never an error: the condition is simply not met.
#[must_use]
pub fn evaluate(value: Option<f64>, operator: ComparisonOperator, threshold: f64) -> bool {
    value.is_some_and(|v| operator.apply(v, threshold))
}
