//! What-if projection of revenue under relative spend changes.

use crate::transforms::ResponseCurve;
use marketmix_core::types::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub current_revenue: f64,
    pub projected_revenue: f64,
    pub delta: f64,
    pub new_spend: BTreeMap<Channel, f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RevenueSimulator {
    curve: ResponseCurve,
}

impl RevenueSimulator {
    pub fn new(curve: ResponseCurve) -> Self {
        Self { curve }
    }

    /// `spend_changes` are fractions: `0.2` is +20 %, `-0.5` halves spend.
    /// Channels without an entry keep their current spend; spend never goes
    /// below zero.
    pub fn simulate(
        &self,
        current_spend: &BTreeMap<Channel, f64>,
        spend_changes: &BTreeMap<Channel, f64>,
        coefficients: &BTreeMap<Channel, f64>,
    ) -> SimulationOutcome {
        let new_spend: BTreeMap<Channel, f64> = current_spend
            .iter()
            .map(|(channel, spend)| {
                let change = spend_changes.get(channel).copied().unwrap_or(0.0);
                (*channel, (spend * (1.0 + change)).max(0.0))
            })
            .collect();

        let current_revenue = self.curve.predicted_revenue(current_spend, coefficients);
        let projected_revenue = self.curve.predicted_revenue(&new_spend, coefficients);
        SimulationOutcome {
            current_revenue,
            projected_revenue,
            delta: projected_revenue - current_revenue,
            new_spend,
        }
    }

    pub fn projected_revenue_delta(
        &self,
        current_spend: &BTreeMap<Channel, f64>,
        spend_changes: &BTreeMap<Channel, f64>,
        coefficients: &BTreeMap<Channel, f64>,
    ) -> f64 {
        self.simulate(current_spend, spend_changes, coefficients).delta
    }
}

/// [`RevenueSimulator::projected_revenue_delta`] with the default curve.
pub fn projected_revenue_delta(
    current_spend: &BTreeMap<Channel, f64>,
    spend_changes: &BTreeMap<Channel, f64>,
    coefficients: &BTreeMap<Channel, f64>,
) -> f64 {
    RevenueSimulator::default().projected_revenue_delta(current_spend, spend_changes, coefficients)
}
