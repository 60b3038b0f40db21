//! Adstock (carryover) and saturation (diminishing returns) transforms.

use marketmix_core::types::Channel;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Per-day retention for a given half-life; `0.5^(1/half_life)`.
/// A non-positive half-life disables carryover.
pub fn decay_for_half_life(half_life: f64) -> f64 {
    if half_life > 0.0 && half_life.is_finite() {
        0.5_f64.powf(1.0 / half_life)
    } else {
        0.0
    }
}

/// `adstocked[t] = spend[t] + decay * adstocked[t-1]`, negative spend clamped to 0.
pub fn adstock(spend: &[f64], half_life: f64) -> Vec<f64> {
    let decay = decay_for_half_life(half_life);
    let mut carry = 0.0;
    spend
        .iter()
        .map(|s| {
            carry = s.max(0.0) + decay * carry;
            carry
        })
        .collect()
}

/// `ln(1 + x)` elementwise.
pub fn saturation(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.max(0.0).ln_1p()).collect()
}

/// Build the days × channels feature matrix from per-channel daily spend
/// columns (all of equal length).
pub fn feature_matrix(spend_columns: &[Vec<f64>], half_life: f64) -> Array2<f64> {
    let days = spend_columns.first().map(Vec::len).unwrap_or(0);
    let mut x = Array2::<f64>::zeros((days, spend_columns.len()));
    for (j, column) in spend_columns.iter().enumerate() {
        let transformed = saturation(&adstock(column, half_life));
        for (i, v) in transformed.into_iter().enumerate().take(days) {
            x[[i, j]] = v;
        }
    }
    x
}

/// Response of revenue to a sustained spend level, shared by the optimizer,
/// simulator and reconciliation so they agree with the fitted features.
///
/// `response(s) = ln(1 + s / (1 - decay))`: saturation of the steady-state
/// adstock reached by spending `s` every day.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCurve {
    decay: f64,
}

impl ResponseCurve {
    pub fn new(half_life: f64) -> Self {
        Self {
            decay: decay_for_half_life(half_life),
        }
    }

    pub fn response(&self, spend: f64) -> f64 {
        (spend.max(0.0) / (1.0 - self.decay)).ln_1p()
    }

    /// Derivative of [`Self::response`] at `spend`.
    pub fn marginal(&self, spend: f64) -> f64 {
        let scale = 1.0 - self.decay;
        1.0 / (scale + spend.max(0.0))
    }

    /// Σ max(coef, 0) × response(spend). Channels without a coefficient
    /// contribute nothing.
    pub fn predicted_revenue(
        &self,
        allocation: &BTreeMap<Channel, f64>,
        coefficients: &BTreeMap<Channel, f64>,
    ) -> f64 {
        allocation
            .iter()
            .map(|(c, spend)| {
                let coef = coefficients.get(c).copied().unwrap_or(0.0).max(0.0);
                coef * self.response(*spend)
            })
            .sum()
    }
}

impl Default for ResponseCurve {
    fn default() -> Self {
        Self::new(7.0)
    }
}
