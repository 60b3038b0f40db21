//! Unified daily metrics per `(date, channel)`.

use chrono::NaiveDate;
use marketmix_core::error::MixResult;
use marketmix_core::store::{FactSource, ResultStore};
use marketmix_core::types::{AttributionEvent, Channel, DailyChannelSpend};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedDailyMetric {
    pub date: NaiveDate,
    pub channel: Channel,
    pub spend: f64,
    pub attributed_revenue: f64,
    /// `attributed_revenue / spend`; `None` without spend.
    pub roas: Option<f64>,
    /// Attributed revenue over spend across all channels on that date.
    pub mer: Option<f64>,
}

/// Outer join of spend and attributed revenue, zero-filled on either side.
pub fn compute_unified_metrics(
    spend: &[DailyChannelSpend],
    events: &[AttributionEvent],
) -> Vec<UnifiedDailyMetric> {
    let mut cells: BTreeMap<(NaiveDate, Channel), (f64, f64)> = BTreeMap::new();
    for row in spend {
        cells.entry((row.date, row.channel)).or_insert((0.0, 0.0)).0 += row.spend;
    }
    for e in events {
        cells.entry((e.event_date, e.channel)).or_insert((0.0, 0.0)).1 += e.allocated_revenue;
    }

    let mut per_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for ((date, _), (s, r)) in &cells {
        let day = per_day.entry(*date).or_insert((0.0, 0.0));
        day.0 += s;
        day.1 += r;
    }

    cells
        .into_iter()
        .map(|((date, channel), (spend, revenue))| {
            let (day_spend, day_revenue) = per_day.get(&date).copied().unwrap_or((0.0, 0.0));
            UnifiedDailyMetric {
                date,
                channel,
                spend,
                attributed_revenue: revenue,
                roas: (spend > 0.0).then(|| revenue / spend),
                mer: (day_spend > 0.0).then(|| day_revenue / day_spend),
            }
        })
        .collect()
}

/// Load the window from `store` and compute metrics, optionally for one
/// attribution run.
pub fn unified_metrics<S: FactSource + ResultStore>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
    attribution_run_id: Option<&str>,
) -> MixResult<Vec<UnifiedDailyMetric>> {
    let spend = store.daily_spend(start, end)?;
    let events = store.attribution_events(start, end, attribution_run_id)?;
    Ok(compute_unified_metrics(&spend, &events))
}
