//! Fractional allocation: splits an order's revenue across channels in
//! proportion to spend share (or to explicitly supplied channel weights).

use chrono::NaiveDate;
use marketmix_core::types::{AttributionEvent, Channel, DailyChannelSpend, Order};
use std::collections::BTreeMap;

pub type ChannelWeights = BTreeMap<Channel, f64>;

#[derive(Debug, Clone, Default)]
pub struct FractionalAllocator {
    recency_half_life_days: Option<f64>,
}

impl FractionalAllocator {
    pub fn new(recency_half_life_days: Option<f64>) -> Self {
        Self {
            recency_half_life_days: recency_half_life_days.filter(|h| *h > 0.0),
        }
    }

    /// Spend share per channel across the whole window, over channels with
    /// positive spend. Empty when nothing was spent.
    pub fn spend_share_weights(daily_spend: &[DailyChannelSpend]) -> ChannelWeights {
        let mut totals = ChannelWeights::new();
        for row in daily_spend {
            *totals.entry(row.channel).or_insert(0.0) += row.spend.max(0.0);
        }
        normalize_positive(totals)
    }

    /// Resolve the weight vector applied to one order.
    pub fn weights_for_order(
        &self,
        order_date: NaiveDate,
        daily_spend: &[DailyChannelSpend],
        explicit: Option<&ChannelWeights>,
    ) -> ChannelWeights {
        let spend_weights = match self.recency_half_life_days {
            Some(half_life) => recency_weights(order_date, daily_spend, half_life),
            None => Self::spend_share_weights(daily_spend),
        };
        resolve_weights(spend_weights, explicit)
    }

    /// Emit one event per channel with nonzero weight for every order.
    ///
    /// Allocated revenue per order sums exactly to the order's effective
    /// revenue; the rounding residual lands on the last channel.
    pub fn allocate(
        &self,
        run_id: &str,
        orders: &[Order],
        daily_spend: &[DailyChannelSpend],
        explicit: Option<&ChannelWeights>,
    ) -> Vec<AttributionEvent> {
        let mut events = Vec::new();
        // Without recency every order shares the window weights.
        let window_weights = match self.recency_half_life_days {
            None => Some(resolve_weights(
                Self::spend_share_weights(daily_spend),
                explicit,
            )),
            Some(_) => None,
        };

        for order in orders {
            let weights = match &window_weights {
                Some(w) => w.clone(),
                None => self.weights_for_order(order.date, daily_spend, explicit),
            };
            let revenue = order.effective_revenue();
            let positive: Vec<(Channel, f64)> =
                weights.into_iter().filter(|(_, w)| *w > 0.0).collect();

            let mut assigned = 0.0;
            for (i, (channel, weight)) in positive.iter().enumerate() {
                let allocated = if i + 1 == positive.len() {
                    revenue - assigned
                } else {
                    revenue * weight
                };
                assigned += allocated;
                events.push(AttributionEvent {
                    order_id: order.order_id.clone(),
                    channel: *channel,
                    campaign_id: None,
                    campaign_name: None,
                    weight: *weight,
                    allocated_revenue: allocated,
                    event_date: order.date,
                    run_id: run_id.to_string(),
                });
            }
        }

        events
    }
}

fn resolve_weights(
    spend_weights: ChannelWeights,
    explicit: Option<&ChannelWeights>,
) -> ChannelWeights {
    if spend_weights.is_empty() {
        let share = 1.0 / Channel::DEFAULT_SET.len() as f64;
        return Channel::DEFAULT_SET.iter().map(|c| (*c, share)).collect();
    }

    if let Some(explicit) = explicit {
        let restricted: ChannelWeights = spend_weights
            .keys()
            .map(|c| (*c, explicit.get(c).copied().unwrap_or(0.0)))
            .collect();
        let normalized = normalize_positive(restricted);
        if !normalized.is_empty() {
            return normalized;
        }
    }

    spend_weights
}

fn recency_weights(
    order_date: NaiveDate,
    daily_spend: &[DailyChannelSpend],
    half_life: f64,
) -> ChannelWeights {
    let mut totals = ChannelWeights::new();
    for row in daily_spend {
        let distance = (order_date - row.date).num_days().unsigned_abs() as f64;
        let decay = 0.5_f64.powf(distance / half_life);
        *totals.entry(row.channel).or_insert(0.0) += row.spend.max(0.0) * decay;
    }
    normalize_positive(totals)
}

/// Drop non-positive entries and scale the rest to sum to 1.
fn normalize_positive(weights: ChannelWeights) -> ChannelWeights {
    let total: f64 = weights.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 || !total.is_finite() {
        return ChannelWeights::new();
    }
    weights
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(c, w)| (c, w / total))
        .collect()
}
