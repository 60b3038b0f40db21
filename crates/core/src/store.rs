//! Store interfaces consumed by the engine, and an in-memory implementation.
//!
//! Facts (orders, clicks, spend) are read-only inputs produced by ingestion.
//! Results (attribution events, MMM coefficients, run metadata) are
//! append-only and always committed as one batch per run and stage, so a
//! failed commit leaves nothing behind for that stage.

use crate::error::{MixError, MixResult};
use crate::spend::aggregate_daily_spend;
use crate::types::{
    AdClick, AttributionEvent, CampaignSpend, DailyChannelSpend, MmmCoefficient, Order,
    RunMetadata,
};
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on `recent_runs` results.
pub const MAX_RECENT_RUNS: usize = 100;

/// Read-only access to ingested facts, filtered by inclusive date range.
pub trait FactSource {
    fn orders(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<Order>>;

    fn ad_clicks(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<AdClick>>;

    /// Spend aggregated per `(date, channel)`, ordered by date then channel.
    fn daily_spend(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<DailyChannelSpend>>;
}

/// Append-only result storage.
pub trait ResultStore {
    /// Persist every attribution event of one run in a single batch. A run
    /// id that already holds events is rejected.
    fn commit_attribution(&self, run_id: &str, events: Vec<AttributionEvent>) -> MixResult<()>;

    /// Events whose `event_date` falls in the range, optionally for one run.
    fn attribution_events(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        run_id: Option<&str>,
    ) -> MixResult<Vec<AttributionEvent>>;

    /// Persist every MMM coefficient of one run in a single batch.
    fn commit_mmm(&self, run_id: &str, coefficients: Vec<MmmCoefficient>) -> MixResult<()>;

    /// Coefficients of the given run, or of the most recently committed run.
    fn latest_coefficients(&self, run_id: Option<&str>) -> MixResult<Vec<MmmCoefficient>>;

    fn record_run(&self, metadata: RunMetadata) -> MixResult<()>;

    /// Most recent runs first, at most `limit` (capped at [`MAX_RECENT_RUNS`]).
    fn recent_runs(&self, limit: usize) -> MixResult<Vec<RunMetadata>>;

    fn latest_run(&self) -> MixResult<Option<RunMetadata>> {
        Ok(self.recent_runs(1)?.into_iter().next())
    }
}

/// Serialized fact tables, as handed over by ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactBundle {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub clicks: Vec<AdClick>,
    #[serde(default)]
    pub spend: Vec<CampaignSpend>,
}

/// In-memory fact source and result store.
pub struct InMemoryStore {
    orders: RwLock<Vec<Order>>,
    clicks: RwLock<Vec<AdClick>>,
    spend: RwLock<Vec<CampaignSpend>>,
    /// run_id -> events
    attribution: DashMap<String, Vec<AttributionEvent>>,
    /// Coefficient batches in commit order.
    mmm: RwLock<Vec<(String, Vec<MmmCoefficient>)>>,
    runs: RwLock<Vec<RunMetadata>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            clicks: RwLock::new(Vec::new()),
            spend: RwLock::new(Vec::new()),
            attribution: DashMap::new(),
            mmm: RwLock::new(Vec::new()),
            runs: RwLock::new(Vec::new()),
        }
    }

    pub fn from_facts(facts: FactBundle) -> Self {
        let store = Self::new();
        info!(
            orders = facts.orders.len(),
            clicks = facts.clicks.len(),
            spend_rows = facts.spend.len(),
            "Loaded fact bundle"
        );
        *store.orders.write() = facts.orders;
        *store.clicks.write() = facts.clicks;
        *store.spend.write() = facts.spend;
        store
    }

    /// Load a JSON-encoded [`FactBundle`] from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> MixResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let facts: FactBundle = serde_json::from_str(&raw)?;
        Ok(Self::from_facts(facts))
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.write().push(order);
    }

    pub fn insert_click(&self, click: AdClick) {
        self.clicks.write().push(click);
    }

    pub fn insert_spend(&self, spend: CampaignSpend) {
        self.spend.write().push(spend);
    }

    /// Total attribution rows across all runs.
    pub fn attribution_row_count(&self) -> usize {
        self.attribution.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn in_range(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    date >= start && date <= end
}

impl FactSource for InMemoryStore {
    fn orders(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|o| in_range(o.date, start, end))
            .cloned()
            .collect())
    }

    fn ad_clicks(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<AdClick>> {
        Ok(self
            .clicks
            .read()
            .iter()
            .filter(|c| in_range(c.date, start, end))
            .cloned()
            .collect())
    }

    fn daily_spend(&self, start: NaiveDate, end: NaiveDate) -> MixResult<Vec<DailyChannelSpend>> {
        let spend = self.spend.read();
        let rows: Vec<CampaignSpend> = spend
            .iter()
            .filter(|s| in_range(s.date, start, end))
            .cloned()
            .collect();
        Ok(aggregate_daily_spend(&rows))
    }
}

impl ResultStore for InMemoryStore {
    fn commit_attribution(&self, run_id: &str, events: Vec<AttributionEvent>) -> MixResult<()> {
        if let Some(bad) = events.iter().find(|e| e.run_id != run_id) {
            return Err(MixError::Validation(format!(
                "event for order {} carries run_id {} inside run {}",
                bad.order_id, bad.run_id, run_id
            )));
        }
        match self.attribution.entry(run_id.to_string()) {
            Entry::Occupied(_) => Err(MixError::Validation(format!(
                "attribution for run {run_id} is already committed"
            ))),
            Entry::Vacant(slot) => {
                debug!(run_id, rows = events.len(), "Committing attribution events");
                slot.insert(events);
                Ok(())
            }
        }
    }

    fn attribution_events(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        run_id: Option<&str>,
    ) -> MixResult<Vec<AttributionEvent>> {
        let matches = |events: &Vec<AttributionEvent>| -> Vec<AttributionEvent> {
            events
                .iter()
                .filter(|e| in_range(e.event_date, start, end))
                .cloned()
                .collect()
        };
        match run_id {
            Some(id) => Ok(self
                .attribution
                .get(id)
                .map(|r| matches(r.value()))
                .unwrap_or_default()),
            None => {
                let mut runs: Vec<String> =
                    self.attribution.iter().map(|r| r.key().clone()).collect();
                runs.sort();
                let mut out = Vec::new();
                for id in runs {
                    if let Some(events) = self.attribution.get(&id) {
                        out.extend(matches(events.value()));
                    }
                }
                Ok(out)
            }
        }
    }

    fn commit_mmm(&self, run_id: &str, coefficients: Vec<MmmCoefficient>) -> MixResult<()> {
        if let Some(bad) = coefficients.iter().find(|c| c.run_id != run_id) {
            return Err(MixError::Validation(format!(
                "coefficient for {} carries run_id {} inside run {}",
                bad.channel, bad.run_id, run_id
            )));
        }
        debug!(run_id, rows = coefficients.len(), "Committing MMM coefficients");
        self.mmm.write().push((run_id.to_string(), coefficients));
        Ok(())
    }

    fn latest_coefficients(&self, run_id: Option<&str>) -> MixResult<Vec<MmmCoefficient>> {
        let batches = self.mmm.read();
        let found = match run_id {
            Some(id) => batches.iter().rev().find(|(rid, _)| rid == id),
            None => batches.last(),
        };
        Ok(found.map(|(_, rows)| rows.clone()).unwrap_or_default())
    }

    fn record_run(&self, metadata: RunMetadata) -> MixResult<()> {
        self.runs.write().push(metadata);
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> MixResult<Vec<RunMetadata>> {
        let mut runs = self.runs.read().clone();
        // Stable sort keeps commit order for identical timestamps.
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs.truncate(limit.min(MAX_RECENT_RUNS));
        Ok(runs)
    }
}
