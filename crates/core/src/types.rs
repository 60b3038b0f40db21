use crate::error::MixError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marketing channel. Variants are declared in name order so that the derived
/// `Ord` (and therefore `BTreeMap` iteration) follows the channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Bing,
    Google,
    Meta,
    Other,
    Pinterest,
}

impl Channel {
    /// Paid channels assumed when no spend data names any channel.
    pub const DEFAULT_SET: [Channel; 4] = [
        Channel::Meta,
        Channel::Google,
        Channel::Bing,
        Channel::Pinterest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Bing => "bing",
            Channel::Google => "google",
            Channel::Meta => "meta",
            Channel::Other => "other",
            Channel::Pinterest => "pinterest",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bing" => Ok(Channel::Bing),
            "google" => Ok(Channel::Google),
            "meta" => Ok(Channel::Meta),
            "other" => Ok(Channel::Other),
            "pinterest" => Ok(Channel::Pinterest),
            other => Err(MixError::Validation(format!("unknown channel '{other}'"))),
        }
    }
}

/// A storefront order as delivered by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub date: NaiveDate,
    pub revenue: f64,
    #[serde(default)]
    pub net_revenue: Option<f64>,
    #[serde(default)]
    pub click_id: Option<String>,
}

impl Order {
    /// Net revenue when refunds have been reconciled, gross otherwise.
    pub fn effective_revenue(&self) -> f64 {
        self.net_revenue.unwrap_or(self.revenue)
    }

    /// Trimmed click identifier, `None` when absent or blank.
    pub fn click_key(&self) -> Option<&str> {
        self.click_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// A tracked ad click. `click_id` is unique across the lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdClick {
    pub click_id: String,
    pub date: NaiveDate,
    pub campaign_id: String,
    #[serde(default)]
    pub campaign_name: Option<String>,
    pub channel: Channel,
}

/// Raw per-campaign spend row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSpend {
    pub date: NaiveDate,
    pub channel: Channel,
    pub campaign_id: String,
    pub spend: f64,
}

/// Spend aggregated to one `(date, channel)` cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyChannelSpend {
    pub date: NaiveDate,
    pub channel: Channel,
    pub spend: f64,
}

/// Credit assigned to one channel for one order in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionEvent {
    pub order_id: String,
    pub channel: Channel,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    /// Share of the order credited here, in `[0, 1]`.
    pub weight: f64,
    pub allocated_revenue: f64,
    pub event_date: NaiveDate,
    pub run_id: String,
}

/// Per-run, per-channel MMM snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmmCoefficient {
    pub run_id: String,
    pub channel: Channel,
    pub coefficient: f64,
    pub r2: Option<f64>,
    pub model_version: String,
}

/// Bookkeeping row written once every stage of a run has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub mta_version: String,
    pub mmm_version: String,
    pub data_snapshot_id: String,
}
