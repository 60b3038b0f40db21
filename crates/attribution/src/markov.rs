//! Markov-chain attribution via the removal effect.
//!
//! ```text
//! paths ──► transition counts ──► P(conversion | start)
//!                                  └─► per channel: P(conversion | channel removed)
//!                                       credit ∝ baseline − removed
//! ```

use crate::fractional::ChannelWeights;
use marketmix_core::types::{AttributionEvent, Channel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const MAX_ITERATIONS: usize = 10_000;
const TOLERANCE: f64 = 1e-12;

/// One customer journey: ordered channel touches and whether it converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchPath {
    pub channels: Vec<Channel>,
    #[serde(default = "default_converted")]
    pub converted: bool,
}

fn default_converted() -> bool {
    true
}

impl TouchPath {
    pub fn converted(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            converted: true,
        }
    }
}

/// Build one converting path per order from allocation events, channels
/// ordered by descending weight (ties by channel name).
pub fn synthesize_paths(events: &[AttributionEvent]) -> Vec<TouchPath> {
    let mut by_order: BTreeMap<&str, Vec<(Channel, f64)>> = BTreeMap::new();
    for e in events {
        by_order
            .entry(e.order_id.as_str())
            .or_default()
            .push((e.channel, e.weight));
    }
    by_order
        .into_values()
        .map(|mut touches| {
            touches.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            TouchPath::converted(touches.into_iter().map(|(c, _)| c).collect())
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MarkovAttributor {
    min_sequences: usize,
}

impl MarkovAttributor {
    pub fn new(min_sequences: usize) -> Self {
        Self {
            min_sequences: min_sequences.max(1),
        }
    }

    pub fn min_sequences(&self) -> usize {
        self.min_sequences
    }

    /// Removal-effect credit per channel, normalized to sum to 1.
    ///
    /// Returns `None` below `min_sequences` paths, when nothing converts, or
    /// when no channel carries a positive removal effect. Channels that only
    /// appear in `channels` (never touched) receive zero credit.
    pub fn credits(&self, paths: &[TouchPath], channels: &[Channel]) -> Option<ChannelWeights> {
        if paths.len() < self.min_sequences {
            debug!(
                paths = paths.len(),
                min_sequences = self.min_sequences,
                "Too few paths for Markov attribution"
            );
            return None;
        }

        let chain = TransitionChain::fit(paths, channels);
        let baseline = chain.conversion_probability(None);
        if baseline <= 0.0 {
            return None;
        }

        let mut effects = ChannelWeights::new();
        for (idx, channel) in chain.channels.iter().enumerate() {
            let removed = chain.conversion_probability(Some(idx));
            effects.insert(*channel, (baseline - removed).max(0.0));
        }

        let total: f64 = effects.values().sum();
        if total <= 0.0 {
            return None;
        }
        Some(effects.into_iter().map(|(c, e)| (c, e / total)).collect())
    }
}

/// First-order chain over {start, channels…, conversion, null}.
struct TransitionChain {
    channels: Vec<Channel>,
    /// Row-stochastic transitions from start (row 0) and each channel
    /// (rows 1..=n) to start/channels/conversion/null columns.
    probs: Vec<Vec<f64>>,
}

impl TransitionChain {
    fn fit(paths: &[TouchPath], channels: &[Channel]) -> Self {
        let set: BTreeSet<Channel> = channels
            .iter()
            .copied()
            .chain(paths.iter().flat_map(|p| p.channels.iter().copied()))
            .collect();
        let channels: Vec<Channel> = set.into_iter().collect();
        let n = channels.len();
        let index: BTreeMap<Channel, usize> =
            channels.iter().enumerate().map(|(i, c)| (*c, i + 1)).collect();
        let conversion = n + 1;
        let null = n + 2;

        let mut counts = vec![vec![0.0; n + 3]; n + 1];
        for path in paths {
            let mut from = 0;
            for channel in &path.channels {
                let to = index[channel];
                counts[from][to] += 1.0;
                from = to;
            }
            let end = if path.converted { conversion } else { null };
            counts[from][end] += 1.0;
        }

        let probs = counts
            .into_iter()
            .map(|row| {
                let total: f64 = row.iter().sum();
                if total > 0.0 {
                    row.into_iter().map(|c| c / total).collect()
                } else {
                    // Unvisited state: absorb into null.
                    let mut r = vec![0.0; n + 3];
                    r[null] = 1.0;
                    r
                }
            })
            .collect();

        Self { channels, probs }
    }

    /// Probability of reaching conversion from start. A removed channel's
    /// state is redirected to null.
    fn conversion_probability(&self, removed: Option<usize>) -> f64 {
        let n = self.channels.len();
        let conversion = n + 1;
        let removed_state = removed.map(|i| i + 1);
        let mut value = vec![0.0; n + 1];

        for _ in 0..MAX_ITERATIONS {
            let mut delta: f64 = 0.0;
            for s in 0..=n {
                if Some(s) == removed_state {
                    continue;
                }
                let row = &self.probs[s];
                let mut v = row[conversion];
                for (t, p) in row.iter().enumerate().take(n + 1).skip(1) {
                    v += p * value[t];
                }
                delta = delta.max((v - value[s]).abs());
                value[s] = v;
            }
            if delta < TOLERANCE {
                break;
            }
        }
        value[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn path(chs: &[Channel], converted: bool) -> TouchPath {
        TouchPath {
            channels: chs.to_vec(),
            converted,
        }
    }

    #[test]
    fn test_below_threshold_returns_none() {
        let paths = vec![path(&[Channel::Meta], true); 9];
        let markov = MarkovAttributor::new(10);
        assert!(markov.credits(&paths, &[Channel::Meta]).is_none());
        let paths = vec![path(&[Channel::Meta], true); 10];
        assert!(markov.credits(&paths, &[Channel::Meta]).is_some());
    }

    #[test]
    fn test_credits_sum_to_one_and_favour_converting_channel() {
        let mut paths = Vec::new();
        for _ in 0..8 {
            paths.push(path(&[Channel::Meta], true));
            paths.push(path(&[Channel::Google], false));
        }
        paths.push(path(&[Channel::Google, Channel::Meta], true));
        paths.push(path(&[Channel::Google], true));

        let credits = MarkovAttributor::new(10)
            .credits(&paths, &[Channel::Meta, Channel::Google])
            .unwrap();
        assert!((credits.values().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(credits[&Channel::Meta] > credits[&Channel::Google]);
    }

    #[test]
    fn test_identical_paths_give_equal_credit() {
        let paths = vec![path(&[Channel::Meta, Channel::Google], true); 12];
        let credits = MarkovAttributor::new(10)
            .credits(&paths, &[Channel::Meta, Channel::Google])
            .unwrap();
        assert!((credits[&Channel::Meta] - 0.5).abs() < 1e-9);
        assert!((credits[&Channel::Google] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_untouched_channel_gets_zero() {
        let paths = vec![path(&[Channel::Meta], true); 10];
        let credits = MarkovAttributor::new(10)
            .credits(&paths, &[Channel::Meta, Channel::Bing])
            .unwrap();
        assert!((credits[&Channel::Meta] - 1.0).abs() < 1e-9);
        assert!(credits[&Channel::Bing].abs() < 1e-12);
    }

    #[test]
    fn test_no_conversions_returns_none() {
        let paths = vec![path(&[Channel::Meta], false); 20];
        assert!(MarkovAttributor::new(10).credits(&paths, &[Channel::Meta]).is_none());
    }

    #[test]
    fn test_synthesized_paths_order_by_weight() {
        let d = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let ev = |order: &str, channel, weight| AttributionEvent {
            order_id: order.to_string(),
            channel,
            campaign_id: None,
            campaign_name: None,
            weight,
            allocated_revenue: 0.0,
            event_date: d,
            run_id: "r".into(),
        };
        let events = vec![
            ev("a", Channel::Google, 0.3),
            ev("a", Channel::Meta, 0.7),
            ev("b", Channel::Pinterest, 0.5),
            ev("b", Channel::Bing, 0.5),
        ];
        let paths = synthesize_paths(&events);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].channels, vec![Channel::Meta, Channel::Google]);
        assert_eq!(paths[1].channels, vec![Channel::Bing, Channel::Pinterest]);
        assert!(paths.iter().all(|p| p.converted));
    }
}
