//! Click-ID attribution: 100% of an order's revenue goes to the channel and
//! campaign that produced the tracked click.

use marketmix_core::types::{AdClick, AttributionEvent, Order};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Output of the click pass.
#[derive(Debug, Clone, Default)]
pub struct ClickAttribution {
    pub events: Vec<AttributionEvent>,
    /// Orders consumed by this pass; later passes must skip them.
    pub attributed: BTreeSet<String>,
}

impl ClickAttribution {
    pub fn count(&self) -> usize {
        self.events.len()
    }
}

pub struct ClickAttributor;

impl ClickAttributor {
    /// Credit every order whose click identifier resolves to a known click.
    ///
    /// Orders with a blank or unknown click id, or with non-positive
    /// revenue, are skipped and left for fractional allocation.
    pub fn attribute(run_id: &str, orders: &[Order], clicks: &[AdClick]) -> ClickAttribution {
        let mut result = ClickAttribution::default();
        if clicks.is_empty() {
            return result;
        }

        let lookup: HashMap<&str, &AdClick> = clicks
            .iter()
            .map(|c| (c.click_id.trim(), c))
            .collect();

        for order in orders {
            let Some(key) = order.click_key() else {
                continue;
            };
            let Some(click) = lookup.get(key) else {
                debug!(order_id = %order.order_id, click_id = key, "Click id not found");
                continue;
            };
            let revenue = order.effective_revenue();
            if revenue <= 0.0 {
                continue;
            }
            if !result.attributed.insert(order.order_id.clone()) {
                continue;
            }
            result.events.push(AttributionEvent {
                order_id: order.order_id.clone(),
                channel: click.channel,
                campaign_id: Some(click.campaign_id.clone()),
                campaign_name: click.campaign_name.clone(),
                weight: 1.0,
                allocated_revenue: revenue,
                event_date: order.date,
                run_id: run_id.to_string(),
            });
        }

        result
    }
}
