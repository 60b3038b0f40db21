//! Greedy budget allocation by marginal predicted revenue.
//!
//! ```text
//! budget ──► split into `steps` increments ──► each increment to the channel
//!            with the best coef × Δresponse / Δspend ──► residual fix-up
//! ```
//!
//! Negative coefficients are clipped to zero: such a channel never wins an
//! increment and contributes nothing to predicted revenue.

use crate::transforms::ResponseCurve;
use marketmix_core::types::Channel;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const DEFAULT_STEPS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct BudgetOptimizer {
    curve: ResponseCurve,
    steps: usize,
}

impl BudgetOptimizer {
    pub fn new(curve: ResponseCurve, steps: usize) -> Self {
        Self {
            curve,
            steps: steps.max(1),
        }
    }

    pub fn curve(&self) -> ResponseCurve {
        self.curve
    }

    /// Split `total_budget` across the union of `coefficients` and
    /// `current_spend` channels. The result sums to `total_budget`.
    pub fn allocate(
        &self,
        total_budget: f64,
        coefficients: &BTreeMap<Channel, f64>,
        current_spend: &BTreeMap<Channel, f64>,
    ) -> BTreeMap<Channel, f64> {
        let mut allocation: BTreeMap<Channel, f64> = coefficients
            .keys()
            .chain(current_spend.keys())
            .map(|c| (*c, 0.0))
            .collect();
        if total_budget.is_nan() || total_budget <= 0.0 || allocation.is_empty() {
            return BTreeMap::new();
        }

        let candidates: Vec<(Channel, f64)> = coefficients
            .iter()
            .filter(|(_, coef)| **coef > 0.0)
            .map(|(c, coef)| (*c, *coef))
            .collect();
        if candidates.is_empty() {
            warn!(total_budget, "No positive coefficients; splitting by current spend");
            return proportional_split(total_budget, allocation, current_spend);
        }

        let increment = total_budget / self.steps as f64;
        let mut spent = 0.0;
        let mut last = candidates[0].0;
        for _ in 0..self.steps {
            let step = increment.min(total_budget - spent);
            if step <= 0.0 {
                break;
            }
            let mut best: Option<(Channel, f64)> = None;
            for (channel, coef) in &candidates {
                let current = allocation.get(channel).copied().unwrap_or(0.0);
                let lift = self.curve.response(current + step) - self.curve.response(current);
                let gain = coef * lift / step;
                if best.map_or(true, |(_, g)| gain > g) {
                    best = Some((*channel, gain));
                }
            }
            if let Some((channel, _)) = best {
                *allocation.entry(channel).or_insert(0.0) += step;
                spent += step;
                last = channel;
            }
        }

        let residual = total_budget - allocation.values().sum::<f64>();
        if residual != 0.0 {
            *allocation.entry(last).or_insert(0.0) += residual;
        }

        debug!(total_budget, steps = self.steps, ?allocation, "Greedy allocation complete");
        allocation
    }

    /// See [`ResponseCurve::predicted_revenue`].
    pub fn predicted_revenue(
        &self,
        allocation: &BTreeMap<Channel, f64>,
        coefficients: &BTreeMap<Channel, f64>,
    ) -> f64 {
        self.curve.predicted_revenue(allocation, coefficients)
    }
}

impl Default for BudgetOptimizer {
    fn default() -> Self {
        Self::new(ResponseCurve::default(), DEFAULT_STEPS)
    }
}

fn proportional_split(
    total_budget: f64,
    mut allocation: BTreeMap<Channel, f64>,
    current_spend: &BTreeMap<Channel, f64>,
) -> BTreeMap<Channel, f64> {
    let total_current: f64 = current_spend.values().map(|s| s.max(0.0)).sum();
    let n = allocation.len() as f64;
    for (channel, value) in allocation.iter_mut() {
        *value = if total_current > 0.0 {
            total_budget * current_spend.get(channel).copied().unwrap_or(0.0).max(0.0)
                / total_current
        } else {
            total_budget / n
        };
    }
    allocation
}

/// [`BudgetOptimizer::allocate`] with the default curve and step count.
pub fn allocate_budget_greedy(
    total_budget: f64,
    coefficients: &BTreeMap<Channel, f64>,
    current_spend: &BTreeMap<Channel, f64>,
) -> BTreeMap<Channel, f64> {
    BudgetOptimizer::default().allocate(total_budget, coefficients, current_spend)
}

/// [`ResponseCurve::predicted_revenue`] with the default curve.
pub fn predicted_revenue(
    allocation: &BTreeMap<Channel, f64>,
    coefficients: &BTreeMap<Channel, f64>,
) -> f64 {
    ResponseCurve::default().predicted_revenue(allocation, coefficients)
}
