//! End-to-end run: attribution → MMM → metrics → reconciliation → metadata.
//!
//! Every stage commits in one batch. The first failing commit aborts the
//! run and no run metadata is recorded, so a partially written run never
//! shows up as the latest run.

use crate::metrics::{unified_metrics, UnifiedDailyMetric};
use crate::reconciliation::{
    compute_alignment, AlignmentReport, ReconciliationReport, ReconciliationScorer,
};
use chrono::{Days, NaiveDate, Utc};
use marketmix_attribution::{AttributionOptions, AttributionRunReport, AttributionRunner};
use marketmix_core::config::AppConfig;
use marketmix_core::error::MixResult;
use marketmix_core::spend::spend_by_channel;
use marketmix_core::store::{FactSource, ResultStore};
use marketmix_core::types::{Channel, RunMetadata};
use marketmix_mmm::{
    BudgetOptimizer, MmmRunResult, MmmRunner, ResponseCurve, RevenueSimulator, SimulationOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRecommendation {
    pub total_budget: f64,
    pub current_spend: BTreeMap<Channel, f64>,
    pub allocation: BTreeMap<Channel, f64>,
    pub current_predicted_revenue: f64,
    pub predicted_revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub metadata: RunMetadata,
    pub attribution_events: usize,
    pub attribution: AttributionRunReport,
    pub mmm: MmmRunResult,
    pub metrics: Vec<UnifiedDailyMetric>,
    pub reconciliation: ReconciliationReport,
    pub alignment: AlignmentReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetRecommendation>,
}

pub struct Pipeline<'a, S> {
    store: &'a S,
    config: AppConfig,
    options: AttributionOptions,
    budget: Option<f64>,
}

impl<'a, S: FactSource + ResultStore> Pipeline<'a, S> {
    pub fn new(store: &'a S, config: &AppConfig) -> Self {
        Self {
            store,
            config: config.clone(),
            options: AttributionOptions::default(),
            budget: None,
        }
    }

    pub fn with_options(mut self, options: AttributionOptions) -> Self {
        self.options = options;
        self
    }

    /// Also recommend how to split `total_budget` once the model is fitted.
    pub fn with_budget(mut self, total_budget: Option<f64>) -> Self {
        self.budget = total_budget;
        self
    }

    fn curve(&self) -> ResponseCurve {
        ResponseCurve::new(self.config.mmm.adstock_half_life)
    }

    pub fn run(&self, run_id: &str, start: NaiveDate, end: NaiveDate) -> MixResult<RunResult> {
        let versions = &self.config.versions;
        info!(run_id, %start, %end, "Pipeline run started");

        let attribution_runner = AttributionRunner::new(
            self.store,
            &self.config.attribution,
            versions.mta_version.clone(),
        );
        let (attribution_events, attribution) = attribution_runner
            .run_attribution_with_diagnostics(run_id, start, end, &self.options)?;

        let mmm_runner = MmmRunner::new(self.store, &self.config.mmm, versions.mmm_version.clone());
        let mmm = mmm_runner.run_mmm(run_id, start, end)?;

        let metrics = unified_metrics(self.store, start, end, Some(run_id))?;

        let scorer = ReconciliationScorer::new(self.curve(), &self.config.reconciliation);
        let reconciliation =
            scorer.build_for_runs(self.store, start, end, Some(run_id), Some(run_id))?;
        let alignment = compute_alignment(
            &reconciliation.attribution_share,
            &reconciliation.mmm_share,
            attribution.confidence_score.min(mmm.confidence_score),
        );

        let metadata = RunMetadata {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            mta_version: versions.mta_version.clone(),
            mmm_version: versions.mmm_version.clone(),
            data_snapshot_id: versions.data_snapshot_id.clone(),
        };
        self.store.record_run(metadata.clone())?;

        let budget = match self.budget {
            Some(total) => Some(self.recommend_budget(total, end, Some(run_id))?),
            None => None,
        };

        info!(
            run_id,
            attribution_events,
            r2 = ?mmm.r2,
            disagreement = reconciliation.disagreement_score,
            flagged = reconciliation.instability_flagged,
            "Pipeline run complete"
        );

        Ok(RunResult {
            metadata,
            attribution_events,
            attribution,
            mmm,
            metrics,
            reconciliation,
            alignment,
            budget,
        })
    }

    /// Split `total_budget` using the given (or latest) coefficients, with
    /// the lookback window ending at `as_of` as current spend.
    pub fn recommend_budget(
        &self,
        total_budget: f64,
        as_of: NaiveDate,
        mmm_run_id: Option<&str>,
    ) -> MixResult<BudgetRecommendation> {
        let coefficients = self.coefficients(mmm_run_id)?;
        let current_spend =
            current_spend_by_channel(self.store, as_of, self.config.optimizer.lookback_days)?;

        let optimizer = BudgetOptimizer::new(self.curve(), self.config.optimizer.steps);
        let allocation = optimizer.allocate(total_budget, &coefficients, &current_spend);
        Ok(BudgetRecommendation {
            total_budget,
            current_predicted_revenue: optimizer.predicted_revenue(&current_spend, &coefficients),
            predicted_revenue: optimizer.predicted_revenue(&allocation, &coefficients),
            current_spend,
            allocation,
        })
    }

    /// Project revenue if current spend changed by the given fractions.
    pub fn simulate(
        &self,
        spend_changes: &BTreeMap<Channel, f64>,
        as_of: NaiveDate,
        mmm_run_id: Option<&str>,
    ) -> MixResult<SimulationOutcome> {
        let coefficients = self.coefficients(mmm_run_id)?;
        let current_spend =
            current_spend_by_channel(self.store, as_of, self.config.optimizer.lookback_days)?;
        Ok(RevenueSimulator::new(self.curve()).simulate(
            &current_spend,
            spend_changes,
            &coefficients,
        ))
    }

    fn coefficients(&self, mmm_run_id: Option<&str>) -> MixResult<BTreeMap<Channel, f64>> {
        Ok(self
            .store
            .latest_coefficients(mmm_run_id)?
            .into_iter()
            .map(|row| (row.channel, row.coefficient))
            .collect())
    }
}

/// Spend per channel over the `lookback_days` days ending at `as_of`.
pub fn current_spend_by_channel<S: FactSource>(
    store: &S,
    as_of: NaiveDate,
    lookback_days: i64,
) -> MixResult<BTreeMap<Channel, f64>> {
    let span = lookback_days.max(1) as u64 - 1;
    let start = as_of.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);
    Ok(spend_by_channel(&store.daily_spend(start, as_of)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketmix_core::store::InMemoryStore;
    use marketmix_core::types::CampaignSpend;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_current_spend_respects_lookback() {
        let store = InMemoryStore::new();
        for (d, spend) in [(1, 100.0), (5, 10.0), (10, 1.0)] {
            store.insert_spend(CampaignSpend {
                date: day(d),
                channel: Channel::Meta,
                campaign_id: "m".into(),
                spend,
            });
        }
        let last_week = current_spend_by_channel(&store, day(10), 6).unwrap();
        assert!((last_week[&Channel::Meta] - 11.0).abs() < f64::EPSILON);
        let single_day = current_spend_by_channel(&store, day(10), 1).unwrap();
        assert!((single_day[&Channel::Meta] - 1.0).abs() < f64::EPSILON);
        let everything = current_spend_by_channel(&store, day(10), 30).unwrap();
        assert!((everything[&Channel::Meta] - 111.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_store_run_degrades_and_records_metadata() {
        let store = InMemoryStore::new();
        let config = AppConfig::default();
        let result = Pipeline::new(&store, &config).run("r0", day(1), day(7)).unwrap();

        assert_eq!(result.attribution_events, 0);
        assert!(result.mmm.r2.is_none());
        assert!(result.metrics.is_empty());
        assert!(!result.reconciliation.instability_flagged);
        assert!(result.budget.is_none());
        assert_eq!(store.latest_run().unwrap().unwrap().run_id, "r0");
    }
}
