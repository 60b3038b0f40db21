//! Grouped spend aggregation with deterministic `(date, channel)` ordering.

use crate::types::{CampaignSpend, Channel, DailyChannelSpend};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Collapse per-campaign spend rows into one row per `(date, channel)`,
/// ordered by date then channel name. Negative spend is treated as zero.
pub fn aggregate_daily_spend(records: &[CampaignSpend]) -> Vec<DailyChannelSpend> {
    let mut cells: BTreeMap<(NaiveDate, Channel), f64> = BTreeMap::new();
    for rec in records {
        *cells.entry((rec.date, rec.channel)).or_insert(0.0) += rec.spend.max(0.0);
    }
    cells
        .into_iter()
        .map(|((date, channel), spend)| DailyChannelSpend {
            date,
            channel,
            spend,
        })
        .collect()
}

/// Total spend per channel across the given rows.
pub fn spend_by_channel(daily: &[DailyChannelSpend]) -> BTreeMap<Channel, f64> {
    let mut totals = BTreeMap::new();
    for row in daily {
        *totals.entry(row.channel).or_insert(0.0) += row.spend;
    }
    totals
}

/// Channels that appear in the spend rows, in name order.
pub fn channels_in(daily: &[DailyChannelSpend]) -> Vec<Channel> {
    spend_by_channel(daily).into_keys().collect()
}
