//! Fit diagnostics: multicollinearity, bootstrap uncertainty, elasticities
//! and an overall confidence score.

use crate::fitter::{MmmFit, MmmFitter};
use crate::linalg;
use marketmix_core::types::Channel;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// VIF reported for perfectly collinear columns.
pub const MAX_VIF: f64 = 1e6;
const NEAR_ZERO: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmmDiagnostics {
    pub vif: BTreeMap<Channel, f64>,
    /// 2.5th / 97.5th percentile of bootstrapped coefficients.
    pub bootstrap_ci: BTreeMap<Channel, ConfidenceInterval>,
    pub elasticities: BTreeMap<Channel, f64>,
    pub stability_index: f64,
    pub confidence_score: f64,
    /// Resamples that produced a usable fit.
    pub bootstrap_samples: usize,
}

impl MmmDiagnostics {
    /// Diagnose `fit`, which must come from `fitter` on the same data.
    pub fn compute(
        features: ArrayView2<f64>,
        revenue: ArrayView1<f64>,
        channels: &[Channel],
        fit: &MmmFit,
        fitter: &MmmFitter,
        n_boot: usize,
        seed: u64,
    ) -> Self {
        let vif = channels
            .iter()
            .enumerate()
            .map(|(j, c)| (*c, variance_inflation(features, j)))
            .collect();

        let elasticities = elasticities(features, revenue, channels, fit);

        let samples = if fit.is_degenerate() {
            Vec::new()
        } else {
            bootstrap(features, revenue, channels, fitter, n_boot, seed)
        };

        // Channels without spend variation are pinned at 0 in every resample
        // and carry no stability signal.
        let active = linalg::varying_columns(features);
        let mut bootstrap_ci = BTreeMap::new();
        let mut cvs = Vec::with_capacity(active.len());
        if !samples.is_empty() {
            for (j, channel) in channels.iter().enumerate() {
                let mut column: Vec<f64> = samples.iter().map(|s| s[j]).collect();
                column.sort_by(f64::total_cmp);
                bootstrap_ci.insert(
                    *channel,
                    ConfidenceInterval {
                        lower: percentile(&column, 0.025),
                        upper: percentile(&column, 0.975),
                    },
                );
                if active.contains(&j) {
                    cvs.push(coefficient_of_variation(&column));
                }
            }
        }

        let stability_index = if cvs.is_empty() {
            0.0
        } else {
            (1.0 - cvs.iter().sum::<f64>() / cvs.len() as f64).clamp(0.0, 1.0)
        };
        let confidence_score = (fit.r2.unwrap_or(0.0).max(0.0) * stability_index).sqrt();

        debug!(
            samples = samples.len(),
            stability_index, confidence_score, "MMM diagnostics computed"
        );

        Self {
            vif,
            bootstrap_ci,
            elasticities,
            stability_index,
            confidence_score,
            bootstrap_samples: samples.len(),
        }
    }
}

/// `1 / (1 - R²)` of column `j` regressed on the remaining columns.
pub fn variance_inflation(features: ArrayView2<f64>, j: usize) -> f64 {
    let (n, p) = features.dim();
    if p < 2 || j >= p || n == 0 {
        return 1.0;
    }
    let target = features.column(j);
    let mean = target.mean().unwrap_or(0.0);
    let ss_tot: f64 = target.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot <= NEAR_ZERO {
        return 1.0;
    }

    let others: Vec<usize> = (0..p).filter(|&k| k != j).collect();
    let rest = features.select(Axis(1), &others);
    let Some(solution) = linalg::ridge(rest.view(), target, 0.0) else {
        return MAX_VIF;
    };
    let ss_res: f64 = target
        .iter()
        .zip(solution.fitted.iter())
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    let r2 = 1.0 - ss_res / ss_tot;
    if r2 >= 1.0 {
        MAX_VIF
    } else {
        (1.0 / (1.0 - r2)).min(MAX_VIF)
    }
}

fn elasticities(
    features: ArrayView2<f64>,
    revenue: ArrayView1<f64>,
    channels: &[Channel],
    fit: &MmmFit,
) -> BTreeMap<Channel, f64> {
    let mean_revenue = revenue.mean().unwrap_or(0.0);
    channels
        .iter()
        .enumerate()
        .map(|(j, c)| {
            let value = if mean_revenue.abs() <= NEAR_ZERO || j >= features.ncols() {
                0.0
            } else {
                let mean_feature = features.column(j).mean().unwrap_or(0.0);
                fit.coefficients.get(c).copied().unwrap_or(0.0) * mean_feature / mean_revenue
            };
            (*c, value)
        })
        .collect()
}

/// Refit on day-level resamples. Iteration `i` draws from its own RNG seeded
/// with `seed + i`; degenerate resamples are dropped.
fn bootstrap(
    features: ArrayView2<f64>,
    revenue: ArrayView1<f64>,
    channels: &[Channel],
    fitter: &MmmFitter,
    n_boot: usize,
    seed: u64,
) -> Vec<Array1<f64>> {
    let n = features.nrows();
    if n == 0 {
        return Vec::new();
    }
    (0..n_boot)
        .filter_map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let x = features.select(Axis(0), &rows);
            let y = revenue.select(Axis(0), &rows);
            let fit = fitter.fit(x.view(), y.view(), channels);
            (!fit.is_degenerate()).then(|| fit.coefficient_vector(channels))
        })
        .collect()
}

/// Linear-interpolated quantile of an ascending slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let pos = q.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if mean.abs() <= NEAR_ZERO {
        if std <= NEAR_ZERO {
            0.0
        } else {
            1.0
        }
    } else {
        std / mean.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn noisy_data(days: usize) -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::<f64>::zeros((days, 2));
        let mut y = Array1::<f64>::zeros(days);
        for i in 0..days {
            let a = ((i * 7) % 11) as f64;
            let b = ((i * 5) % 13) as f64 / 2.0;
            let noise = if i % 2 == 0 { 0.3 } else { -0.3 };
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            y[i] = 20.0 + 4.0 * a + 2.0 * b + noise;
        }
        (x, y)
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&v, 0.5) - 3.0).abs() < f64::EPSILON);
        assert!((percentile(&v, 0.025) - 1.1).abs() < 1e-12);
        assert!((percentile(&v, 0.975) - 4.9).abs() < 1e-12);
        assert!((percentile(&[2.5], 0.9) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_vif_independent_and_collinear() {
        let x = array![[1.0, 1.0], [2.0, -1.0], [3.0, -1.0], [4.0, 1.0]];
        assert!((variance_inflation(x.view(), 0) - 1.0).abs() < 1e-9);

        let collinear = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        assert!((variance_inflation(collinear.view(), 0) - MAX_VIF).abs() < f64::EPSILON);

        let single = array![[1.0], [2.0]];
        assert!((variance_inflation(single.view(), 0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_constant_column_vif_is_one() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        assert!((variance_inflation(x.view(), 1) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bootstrap_ci_brackets_point_estimate() {
        let (x, y) = noisy_data(40);
        let channels = [Channel::Meta, Channel::Google];
        let fitter = MmmFitter::new(0.01);
        let fit = fitter.fit(x.view(), y.view(), &channels);
        let d = MmmDiagnostics::compute(x.view(), y.view(), &channels, &fit, &fitter, 200, 42);

        assert_eq!(d.bootstrap_samples, 200);
        for c in channels {
            let ci = d.bootstrap_ci[&c];
            assert!(ci.lower <= fit.coefficients[&c] && fit.coefficients[&c] <= ci.upper);
        }
        assert!(d.stability_index > 0.9);
        assert!(d.confidence_score > 0.9 && d.confidence_score <= 1.0);
    }

    #[test]
    fn test_bootstrap_is_seed_reproducible() {
        let (x, y) = noisy_data(25);
        let channels = [Channel::Meta, Channel::Google];
        let fitter = MmmFitter::default();
        let fit = fitter.fit(x.view(), y.view(), &channels);
        let a = MmmDiagnostics::compute(x.view(), y.view(), &channels, &fit, &fitter, 50, 9);
        let b = MmmDiagnostics::compute(x.view(), y.view(), &channels, &fit, &fitter, 50, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_elasticity_definition() {
        let (x, y) = noisy_data(30);
        let channels = [Channel::Meta, Channel::Google];
        let fitter = MmmFitter::new(0.0);
        let fit = fitter.fit(x.view(), y.view(), &channels);
        let d = MmmDiagnostics::compute(x.view(), y.view(), &channels, &fit, &fitter, 0, 1);
        let expected = fit.coefficients[&Channel::Meta] * x.column(0).mean().unwrap()
            / y.mean().unwrap();
        assert!((d.elasticities[&Channel::Meta] - expected).abs() < 1e-12);
        // No resamples, no stability.
        assert!(d.bootstrap_ci.is_empty());
        assert!(d.confidence_score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_degenerate_fit_has_zero_confidence() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![4.0, 4.0, 4.0];
        let fitter = MmmFitter::default();
        let fit = fitter.fit(x.view(), y.view(), &[Channel::Meta]);
        let d = MmmDiagnostics::compute(x.view(), y.view(), &[Channel::Meta], &fit, &fitter, 20, 1);
        assert_eq!(d.bootstrap_samples, 0);
        assert!(d.confidence_score.abs() < f64::EPSILON);
        assert!(d.elasticities[&Channel::Meta].abs() < f64::EPSILON);
    }

    #[test]
    fn test_cv_edge_cases() {
        assert!(coefficient_of_variation(&[0.0, 0.0]).abs() < f64::EPSILON);
        assert!((coefficient_of_variation(&[-1.0, 1.0]) - 1.0).abs() < f64::EPSILON);
        assert!((coefficient_of_variation(&[2.0, 2.0])).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_spend_channels_do_not_change_stability() {
        let (x, y) = noisy_data(30);
        let two = [Channel::Meta, Channel::Google];
        let four = [Channel::Meta, Channel::Google, Channel::Bing, Channel::Pinterest];
        let mut padded = Array2::<f64>::zeros((30, 4));
        padded.slice_mut(ndarray::s![.., 0..2]).assign(&x);

        let fitter = MmmFitter::new(1.0);
        let fit2 = fitter.fit(x.view(), y.view(), &two);
        let fit4 = fitter.fit(padded.view(), y.view(), &four);
        let d2 = MmmDiagnostics::compute(x.view(), y.view(), &two, &fit2, &fitter, 200, 3);
        let d4 = MmmDiagnostics::compute(padded.view(), y.view(), &four, &fit4, &fitter, 200, 3);

        assert!((d2.stability_index - d4.stability_index).abs() < 1e-12);
        assert!((d2.confidence_score - d4.confidence_score).abs() < 1e-12);
        assert!(d4.bootstrap_ci.contains_key(&Channel::Bing));
    }

    #[test]
    fn test_no_varying_channel_has_zero_stability() {
        let x = Array2::<f64>::zeros((6, 2));
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let channels = [Channel::Meta, Channel::Google];
        let fitter = MmmFitter::default();
        let fit = fitter.fit(x.view(), y.view(), &channels);
        let d = MmmDiagnostics::compute(x.view(), y.view(), &channels, &fit, &fitter, 20, 1);
        assert!(d.stability_index.abs() < f64::EPSILON);
        assert!(d.confidence_score.abs() < f64::EPSILON);
    }
}
