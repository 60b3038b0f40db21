//! Attribution vs MMM reconciliation.
//!
//! Attribution shares come from allocated revenue per channel; MMM shares
//! from `max(coef, 0) × response(window spend)`. The L1 distance between
//! the two share vectors (range 0..=2) is the disagreement score.

use chrono::NaiveDate;
use marketmix_core::config::ReconciliationConfig;
use marketmix_core::error::MixResult;
use marketmix_core::spend::spend_by_channel;
use marketmix_core::store::{FactSource, ResultStore};
use marketmix_core::types::Channel;
use marketmix_mmm::ResponseCurve;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub channels: Vec<Channel>,
    pub attribution_share: BTreeMap<Channel, f64>,
    pub mmm_share: BTreeMap<Channel, f64>,
    /// Σ |attribution − mmm|, rounded to 4 decimals.
    pub disagreement_score: f64,
    pub instability_flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAlignment {
    pub channel: Channel,
    pub attribution_share: f64,
    pub mmm_share: f64,
    /// `attribution_share − mmm_share`.
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub channels: Vec<ChannelAlignment>,
    pub disagreement_score: f64,
    /// `1 − disagreement / 2`: 1 is perfect agreement, 0 disjoint shares.
    pub overall_alignment_score: f64,
    pub alignment_confidence: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationScorer {
    curve: ResponseCurve,
    threshold: f64,
}

impl ReconciliationScorer {
    pub fn new(curve: ResponseCurve, config: &ReconciliationConfig) -> Self {
        Self {
            curve,
            threshold: config.instability_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compare attributed revenue totals with coefficient-implied
    /// contributions at the given spend.
    pub fn score(
        &self,
        attributed_revenue: &BTreeMap<Channel, f64>,
        coefficients: &BTreeMap<Channel, f64>,
        spend: &BTreeMap<Channel, f64>,
    ) -> ReconciliationReport {
        let attribution_share = normalize(attributed_revenue);
        let contributions: BTreeMap<Channel, f64> = coefficients
            .iter()
            .map(|(c, coef)| {
                let s = spend.get(c).copied().unwrap_or(0.0);
                (*c, coef.max(0.0) * self.curve.response(s))
            })
            .collect();
        let mmm_share = normalize(&contributions);

        let channels: Vec<Channel> = attribution_share
            .keys()
            .chain(mmm_share.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let disagreement = l1(&channels, &attribution_share, &mmm_share);
        let instability_flagged = disagreement > self.threshold;
        metrics::counter!("reconciliation.scored").increment(1);
        if instability_flagged {
            metrics::counter!("reconciliation.flagged").increment(1);
            warn!(
                disagreement,
                threshold = self.threshold,
                "Attribution and MMM disagree on channel shares"
            );
        }

        ReconciliationReport {
            channels,
            attribution_share,
            mmm_share,
            disagreement_score: round4(disagreement),
            instability_flagged,
        }
    }

    /// Reconcile every attribution run in the window against the latest
    /// committed MMM coefficients.
    pub fn build_attribution_mmm_report<S: FactSource + ResultStore>(
        &self,
        store: &S,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MixResult<ReconciliationReport> {
        self.build_for_runs(store, start, end, None, None)
    }

    /// Same as [`Self::build_attribution_mmm_report`] pinned to specific runs.
    pub fn build_for_runs<S: FactSource + ResultStore>(
        &self,
        store: &S,
        start: NaiveDate,
        end: NaiveDate,
        attribution_run_id: Option<&str>,
        mmm_run_id: Option<&str>,
    ) -> MixResult<ReconciliationReport> {
        let mut attributed = BTreeMap::new();
        for e in store.attribution_events(start, end, attribution_run_id)? {
            *attributed.entry(e.channel).or_insert(0.0) += e.allocated_revenue;
        }
        let coefficients: BTreeMap<Channel, f64> = store
            .latest_coefficients(mmm_run_id)?
            .into_iter()
            .map(|row| (row.channel, row.coefficient))
            .collect();
        let spend = spend_by_channel(&store.daily_spend(start, end)?);

        let report = self.score(&attributed, &coefficients, &spend);
        info!(
            %start,
            %end,
            channels = report.channels.len(),
            disagreement = report.disagreement_score,
            flagged = report.instability_flagged,
            "Reconciliation report built"
        );
        Ok(report)
    }
}

impl Default for ReconciliationScorer {
    fn default() -> Self {
        Self::new(ResponseCurve::default(), &ReconciliationConfig::default())
    }
}

/// Per-channel gaps and an overall alignment score for two share vectors.
pub fn compute_alignment(
    attribution_share: &BTreeMap<Channel, f64>,
    mmm_share: &BTreeMap<Channel, f64>,
    alignment_confidence: f64,
) -> AlignmentReport {
    let channels: BTreeSet<Channel> = attribution_share
        .keys()
        .chain(mmm_share.keys())
        .copied()
        .collect();
    let rows: Vec<ChannelAlignment> = channels
        .iter()
        .map(|c| {
            let a = attribution_share.get(c).copied().unwrap_or(0.0);
            let m = mmm_share.get(c).copied().unwrap_or(0.0);
            ChannelAlignment {
                channel: *c,
                attribution_share: a,
                mmm_share: m,
                gap: a - m,
            }
        })
        .collect();
    let disagreement: f64 = rows.iter().map(|r| r.gap.abs()).sum();

    AlignmentReport {
        channels: rows,
        disagreement_score: round4(disagreement),
        overall_alignment_score: round4((1.0 - disagreement / 2.0).clamp(0.0, 1.0)),
        alignment_confidence: alignment_confidence.clamp(0.0, 1.0),
    }
}

/// Shares over the map's own keys; a zero total yields zero shares.
fn normalize(values: &BTreeMap<Channel, f64>) -> BTreeMap<Channel, f64> {
    let total: f64 = values.values().sum();
    let denom = if total != 0.0 { total } else { 1.0 };
    values.iter().map(|(c, v)| (*c, v / denom)).collect()
}

fn l1(channels: &[Channel], a: &BTreeMap<Channel, f64>, b: &BTreeMap<Channel, f64>) -> f64 {
    channels
        .iter()
        .map(|c| (a.get(c).copied().unwrap_or(0.0) - b.get(c).copied().unwrap_or(0.0)).abs())
        .sum()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(Channel, f64)]) -> BTreeMap<Channel, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_heavy_disagreement_is_flagged() {
        let scorer = ReconciliationScorer::default();
        // Equal coefficients at equal spend give equal contributions; skew
        // them with the coefficients to land on a 0.3 / 0.7 MMM split.
        let report = scorer.score(
            &map(&[(Channel::Meta, 600.0), (Channel::Google, 400.0)]),
            &map(&[(Channel::Meta, 3.0), (Channel::Google, 7.0)]),
            &map(&[(Channel::Meta, 500.0), (Channel::Google, 500.0)]),
        );
        assert!((report.attribution_share[&Channel::Meta] - 0.6).abs() < 1e-12);
        assert!((report.mmm_share[&Channel::Meta] - 0.3).abs() < 1e-12);
        assert!((report.disagreement_score - 0.6).abs() < 1e-12);
        assert!(report.instability_flagged);
        assert_eq!(report.channels, vec![Channel::Google, Channel::Meta]);
    }

    #[test]
    fn test_agreement_is_not_flagged() {
        let scorer = ReconciliationScorer::default();
        let report = scorer.score(
            &map(&[(Channel::Meta, 500.0), (Channel::Google, 500.0)]),
            &map(&[(Channel::Meta, 1.0), (Channel::Google, 1.0)]),
            &map(&[(Channel::Meta, 100.0), (Channel::Google, 100.0)]),
        );
        assert!(report.disagreement_score.abs() < 1e-12);
        assert!(!report.instability_flagged);
    }

    #[test]
    fn test_missing_channel_counts_as_zero() {
        let scorer = ReconciliationScorer::default();
        let report = scorer.score(
            &map(&[(Channel::Meta, 100.0)]),
            &map(&[(Channel::Google, 1.0)]),
            &map(&[(Channel::Google, 10.0)]),
        );
        assert_eq!(report.channels.len(), 2);
        assert!((report.disagreement_score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_coefficient_clipped_and_zero_total() {
        let scorer = ReconciliationScorer::default();
        let report = scorer.score(
            &BTreeMap::new(),
            &map(&[(Channel::Bing, -2.0)]),
            &map(&[(Channel::Bing, 100.0)]),
        );
        assert!(report.mmm_share[&Channel::Bing].abs() < f64::EPSILON);
        assert!(report.disagreement_score.abs() < f64::EPSILON);
        assert!(!report.instability_flagged);
    }

    #[test]
    fn test_disagreement_rounded_to_four_decimals() {
        let scorer = ReconciliationScorer::default();
        let report = scorer.score(
            &map(&[(Channel::Meta, 1.0), (Channel::Google, 2.0)]),
            &map(&[(Channel::Meta, 1.0)]),
            &map(&[(Channel::Meta, 10.0)]),
        );
        // |1/3 - 1| + |2/3 - 0| = 4/3
        assert!((report.disagreement_score - 1.3333).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let config = ReconciliationConfig {
            instability_threshold: 1.0,
        };
        let scorer = ReconciliationScorer::new(ResponseCurve::default(), &config);
        // 1.0 vs 0.5 / 0.5 is a disagreement of exactly 1.0.
        let report = scorer.score(
            &map(&[(Channel::Meta, 10.0)]),
            &map(&[(Channel::Meta, 1.0), (Channel::Google, 1.0)]),
            &map(&[(Channel::Meta, 50.0), (Channel::Google, 50.0)]),
        );
        assert!((report.disagreement_score - 1.0).abs() < f64::EPSILON);
        assert!(!report.instability_flagged);
    }

    #[test]
    fn test_alignment_score() {
        let a = map(&[(Channel::Meta, 0.6), (Channel::Google, 0.4)]);
        let m = map(&[(Channel::Meta, 0.3), (Channel::Google, 0.7)]);
        let report = compute_alignment(&a, &m, 0.8);
        assert!((report.disagreement_score - 0.6).abs() < 1e-12);
        assert!((report.overall_alignment_score - 0.7).abs() < 1e-12);
        let meta = report.channels.iter().find(|r| r.channel == Channel::Meta).unwrap();
        assert!((meta.gap - 0.3).abs() < 1e-12);
        assert!((report.alignment_confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disagreement_grows_with_share_gap() {
        let scorer = ReconciliationScorer::default();
        let coefs = map(&[(Channel::Meta, 1.0), (Channel::Google, 1.0)]);
        let spend = map(&[(Channel::Meta, 100.0), (Channel::Google, 100.0)]);
        let mmm_share = map(&[(Channel::Meta, 0.5), (Channel::Google, 0.5)]);

        let mut previous_scored = 0.0;
        let mut previous_aligned = 0.0;
        for k in 0..=20 {
            let meta = 500.0 + 25.0 * k as f64;
            let report = scorer.score(
                &map(&[(Channel::Meta, meta), (Channel::Google, 1000.0 - meta)]),
                &coefs,
                &spend,
            );
            assert!(report.disagreement_score + 1e-12 >= previous_scored);
            previous_scored = report.disagreement_score;

            let widened = map(&[(Channel::Meta, 0.5 + 0.05 * k as f64), (Channel::Google, 0.5)]);
            let aligned = compute_alignment(&widened, &mmm_share, 1.0);
            assert!(aligned.disagreement_score + 1e-12 >= previous_aligned);
            previous_aligned = aligned.disagreement_score;
        }
        assert!((previous_scored - 1.0).abs() < 1e-12);
        assert!((previous_aligned - 1.0).abs() < 1e-12);
    }
}
