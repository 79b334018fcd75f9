//! Interpolation curves for sunrise/sunset ramps.

use serde::{Deserialize, Serialize};

/// Shape of a ramp, mapping elapsed fraction `t ∈ [0, 1]` to an output
/// fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    #[default]
    Linear,
    Sigmoid,
    Exponential,
}

/// Steepness constants for the non-linear shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    pub sigmoid_steepness: f64,
    pub exponential_steepness: f64,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            sigmoid_steepness: 10.0,
            exponential_steepness: 3.0,
        }
    }
}

impl CurveShape {
    /// Evaluate the curve.
    ///
    /// `t` is clamped to `[0, 1]` and both endpoints map exactly to `0.0`
    /// and `1.0` whatever the steepness. A non-positive or non-finite
    /// steepness degrades to linear.
    #[must_use]
    pub fn apply(self, t: f64, params: &CurveParams) -> f64 {
        if t.is_nan() || t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }
        let value = match self {
            Self::Linear => t,
            Self::Sigmoid => sigmoid(t, params.sigmoid_steepness),
            Self::Exponential => exponential(t, params.exponential_steepness),
        };
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            t
        }
    }
}

fn usable(k: f64) -> bool {
    k.is_finite() && k > 0.0
}

fn sigmoid(t: f64, k: f64) -> f64 {
    if !usable(k) {
        return t;
    }
    let raw = |x: f64| 1.0 / (1.0 + (-k * (x - 0.5)).exp());
    let low = raw(0.0);
    let high = raw(1.0);
    (raw(t) - low) / (high - low)
}

// (e^kt - 1) / (e^k - 1), factored by e^k so large k cannot overflow
fn exponential(t: f64, k: f64) -> f64 {
    if !usable(k) {
        return t;
    }
    (k * (t - 1.0)).exp() * (-k * t).exp_m1() / (-k).exp_m1()
}

impl std::fmt::Display for CurveShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Linear => "linear",
            Self::Sigmoid => "sigmoid",
            Self::Exponential => "exponential",
        })
    }
}
