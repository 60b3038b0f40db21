//! Attribution runner: click-ID first, then fractional (or Markov-refined)
//! allocation for the remaining orders, committed as one batch per run.

use crate::click::ClickAttributor;
use crate::diagnostics::{run_diagnostics, AttributionDiagnostics};
use crate::fractional::{ChannelWeights, FractionalAllocator};
use crate::markov::{synthesize_paths, MarkovAttributor, TouchPath};
use chrono::{DateTime, NaiveDate, Utc};
use marketmix_core::config::AttributionConfig;
use marketmix_core::error::MixResult;
use marketmix_core::spend::channels_in;
use marketmix_core::store::{FactSource, ResultStore};
use marketmix_core::types::{AttributionEvent, Channel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-call inputs that do not belong in static configuration.
#[derive(Debug, Clone, Default)]
pub struct AttributionOptions {
    /// Externally supplied channel weights for the fractional pass.
    pub channel_weights: Option<ChannelWeights>,
    /// Observed customer journeys for the Markov model.
    pub session_paths: Option<Vec<TouchPath>>,
}

/// Report returned alongside the event count by
/// [`AttributionRunner::run_attribution_with_diagnostics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRunReport {
    pub run_id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Share of fractionally allocated revenue per channel.
    pub allocations: BTreeMap<Channel, f64>,
    pub diagnostics: AttributionDiagnostics,
    pub confidence_score: f64,
    pub click_attributed_orders: usize,
    pub markov_applied: bool,
}

struct AttributionPass {
    click_events: usize,
    fractional: Vec<AttributionEvent>,
    channels: Vec<Channel>,
    paths: Option<Vec<TouchPath>>,
    markov_applied: bool,
    written: usize,
}

pub struct AttributionRunner<'a, S> {
    store: &'a S,
    config: AttributionConfig,
    version: String,
}

impl<'a, S: FactSource + ResultStore> AttributionRunner<'a, S> {
    pub fn new(store: &'a S, config: &AttributionConfig, version: impl Into<String>) -> Self {
        Self {
            store,
            config: config.clone(),
            version: version.into(),
        }
    }

    /// Attribute every order in `[start, end]`; returns the number of
    /// attribution events written.
    pub fn run_attribution(
        &self,
        run_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &AttributionOptions,
    ) -> MixResult<usize> {
        Ok(self.execute(run_id, start, end, options)?.written)
    }

    /// Same as [`Self::run_attribution`] plus allocation shares and
    /// confidence diagnostics for the fractional/Markov pass.
    pub fn run_attribution_with_diagnostics(
        &self,
        run_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &AttributionOptions,
    ) -> MixResult<(usize, AttributionRunReport)> {
        let pass = self.execute(run_id, start, end, options)?;

        let paths = match pass.paths {
            Some(paths) => paths,
            None => synthesize_paths(&pass.fractional),
        };
        let diagnostics = run_diagnostics(
            &paths,
            &pass.channels,
            self.config.target_paths,
            self.config.seed,
        );

        let mut by_channel: BTreeMap<Channel, f64> =
            pass.channels.iter().map(|c| (*c, 0.0)).collect();
        for e in &pass.fractional {
            *by_channel.entry(e.channel).or_insert(0.0) += e.allocated_revenue;
        }
        let total: f64 = by_channel.values().sum();
        let denom = if total != 0.0 { total } else { 1.0 };
        let allocations = by_channel
            .into_iter()
            .map(|(c, rev)| (c, rev / denom))
            .collect();

        info!(
            run_id,
            events = pass.written,
            paths = diagnostics.path_count,
            confidence = diagnostics.confidence_score,
            "Attribution diagnostics computed"
        );

        let report = AttributionRunReport {
            run_id: run_id.to_string(),
            version: self.version.clone(),
            timestamp: Utc::now(),
            allocations,
            confidence_score: diagnostics.confidence_score,
            diagnostics,
            click_attributed_orders: pass.click_events,
            markov_applied: pass.markov_applied,
        };
        Ok((pass.written, report))
    }

    fn execute(
        &self,
        run_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &AttributionOptions,
    ) -> MixResult<AttributionPass> {
        let orders = self.store.orders(start, end)?;
        let clicks = self.store.ad_clicks(start, end)?;
        let daily_spend = self.store.daily_spend(start, end)?;

        let mut channels = channels_in(&daily_spend);
        if channels.is_empty() {
            channels = Channel::DEFAULT_SET.to_vec();
        }

        let click = ClickAttributor::attribute(run_id, &orders, &clicks);
        let remaining: Vec<_> = orders
            .into_iter()
            .filter(|o| !click.attributed.contains(&o.order_id))
            .collect();
        debug!(
            run_id,
            click_events = click.count(),
            remaining = remaining.len(),
            "Click-ID pass complete"
        );

        let allocator = FractionalAllocator::new(self.config.recency_half_life_days);
        let mut fractional =
            allocator.allocate(run_id, &remaining, &daily_spend, options.channel_weights.as_ref());

        let paths = match &options.session_paths {
            Some(paths) => Some(paths.clone()),
            None if self.config.synthesize_paths => Some(synthesize_paths(&fractional)),
            None => None,
        };

        let mut markov_applied = false;
        if let Some(paths) = &paths {
            let markov = MarkovAttributor::new(self.config.min_sequences);
            if let Some(weights) = markov.credits(paths, &channels) {
                debug!(run_id, ?weights, "Markov weights replace spend share");
                fractional = allocator.allocate(run_id, &remaining, &daily_spend, Some(&weights));
                markov_applied = true;
            }
        }

        let click_events = click.count();
        let mut events = click.events;
        events.extend(fractional.iter().cloned());
        let written = events.len();
        if written > 0 {
            self.store.commit_attribution(run_id, events)?;
        }
        metrics::counter!("attribution.events_written").increment(written as u64);
        metrics::counter!("attribution.click_orders").increment(click.attributed.len() as u64);
        if markov_applied {
            metrics::counter!("attribution.markov_applied").increment(1);
        }

        info!(
            run_id,
            %start,
            %end,
            click_events,
            fractional_events = fractional.len(),
            markov_applied,
            "Attribution run committed"
        );

        Ok(AttributionPass {
            click_events,
            fractional,
            channels,
            paths,
            markov_applied,
            written,
        })
    }
}
