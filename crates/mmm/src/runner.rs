//! MMM run: load the window, build features, fit, diagnose and commit one
//! coefficient row per channel.

use crate::diagnostics::{ConfidenceInterval, MmmDiagnostics};
use crate::fitter::MmmFitter;
use crate::transforms::feature_matrix;
use chrono::NaiveDate;
use marketmix_core::config::MmmConfig;
use marketmix_core::error::MixResult;
use marketmix_core::store::{FactSource, ResultStore};
use marketmix_core::types::{Channel, MmmCoefficient};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmmRunResult {
    pub run_id: String,
    pub model_version: String,
    pub days: usize,
    pub channels: Vec<Channel>,
    pub coefficients: BTreeMap<Channel, f64>,
    pub intercept: f64,
    pub r2: Option<f64>,
    pub adj_r2: Option<f64>,
    pub mape: Option<f64>,
    pub vif: BTreeMap<Channel, f64>,
    pub elasticities: BTreeMap<Channel, f64>,
    pub bootstrap_ci: BTreeMap<Channel, ConfidenceInterval>,
    pub stability_index: f64,
    pub confidence_score: f64,
}

pub struct MmmRunner<'a, S> {
    store: &'a S,
    config: MmmConfig,
    version: String,
}

impl<'a, S: FactSource + ResultStore> MmmRunner<'a, S> {
    pub fn new(store: &'a S, config: &MmmConfig, version: impl Into<String>) -> Self {
        Self {
            store,
            config: config.clone(),
            version: version.into(),
        }
    }

    pub fn run_mmm(
        &self,
        run_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MixResult<MmmRunResult> {
        let channels = self.config.channels.clone();
        let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let index: BTreeMap<NaiveDate, usize> =
            days.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut revenue = Array1::<f64>::zeros(days.len());
        for order in self.store.orders(start, end)? {
            if let Some(&i) = index.get(&order.date) {
                revenue[i] += order.effective_revenue();
            }
        }

        let column_of: BTreeMap<Channel, usize> =
            channels.iter().enumerate().map(|(j, c)| (*c, j)).collect();
        let mut spend_columns = vec![vec![0.0; days.len()]; channels.len()];
        for row in self.store.daily_spend(start, end)? {
            if let (Some(&j), Some(&i)) = (column_of.get(&row.channel), index.get(&row.date)) {
                spend_columns[j][i] += row.spend;
            }
        }

        let features = feature_matrix(&spend_columns, self.config.adstock_half_life);
        let fitter = MmmFitter::new(self.config.ridge_alpha);
        let fit = fitter.fit(features.view(), revenue.view(), &channels);
        let diagnostics = MmmDiagnostics::compute(
            features.view(),
            revenue.view(),
            &channels,
            &fit,
            &fitter,
            self.config.n_boot,
            self.config.seed,
        );

        let rows: Vec<MmmCoefficient> = channels
            .iter()
            .map(|c| MmmCoefficient {
                run_id: run_id.to_string(),
                channel: *c,
                coefficient: fit.coefficients.get(c).copied().unwrap_or(0.0),
                r2: fit.r2,
                model_version: self.version.clone(),
            })
            .collect();
        if !rows.is_empty() {
            self.store.commit_mmm(run_id, rows)?;
        }
        metrics::counter!("mmm.runs").increment(1);
        if fit.is_degenerate() {
            metrics::counter!("mmm.degraded_fits").increment(1);
        }
        metrics::gauge!("mmm.confidence_score").set(diagnostics.confidence_score);

        info!(
            run_id,
            %start,
            %end,
            days = days.len(),
            r2 = ?fit.r2,
            confidence = diagnostics.confidence_score,
            "MMM run committed"
        );

        Ok(MmmRunResult {
            run_id: run_id.to_string(),
            model_version: self.version.clone(),
            days: days.len(),
            channels,
            coefficients: fit.coefficients,
            intercept: fit.intercept,
            r2: fit.r2,
            adj_r2: fit.adj_r2,
            mape: fit.mape,
            vif: diagnostics.vif,
            elasticities: diagnostics.elasticities,
            bootstrap_ci: diagnostics.bootstrap_ci,
            stability_index: diagnostics.stability_index,
            confidence_score: diagnostics.confidence_score,
        })
    }
}
