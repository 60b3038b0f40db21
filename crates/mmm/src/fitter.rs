//! Ridge-regularized linear model from transformed spend to daily revenue.

use crate::linalg;
use marketmix_core::types::Channel;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of one fit. `r2` is `None` whenever the fit degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmmFit {
    pub coefficients: BTreeMap<Channel, f64>,
    pub intercept: f64,
    pub r2: Option<f64>,
    pub adj_r2: Option<f64>,
    /// Mean absolute percentage error over days with nonzero revenue.
    pub mape: Option<f64>,
}

impl MmmFit {
    fn degenerate(channels: &[Channel], intercept: f64) -> Self {
        Self {
            coefficients: channels.iter().map(|c| (*c, 0.0)).collect(),
            intercept,
            r2: None,
            adj_r2: None,
            mape: None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.r2.is_none()
    }

    /// Coefficients in the column order of `channels`.
    pub fn coefficient_vector(&self, channels: &[Channel]) -> Array1<f64> {
        channels
            .iter()
            .map(|c| self.coefficients.get(c).copied().unwrap_or(0.0))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MmmFitter {
    alpha: f64,
}

impl MmmFitter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.max(0.0),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fit `revenue ≈ intercept + features · coefficients`.
    ///
    /// `features` is days × channels with columns in `channels` order.
    pub fn fit(
        &self,
        features: ArrayView2<f64>,
        revenue: ArrayView1<f64>,
        channels: &[Channel],
    ) -> MmmFit {
        let (n, p) = features.dim();
        if n == 0 || p == 0 || revenue.len() != n || p != channels.len() {
            warn!(
                days = n,
                columns = p,
                revenue_len = revenue.len(),
                channels = channels.len(),
                "Degenerate MMM input; returning zero coefficients"
            );
            return MmmFit::degenerate(channels, 0.0);
        }

        let y_mean = revenue.mean().unwrap_or(0.0);
        let ss_tot: f64 = revenue.iter().map(|y| (y - y_mean).powi(2)).sum();
        if ss_tot <= f64::EPSILON {
            debug!(days = n, "Constant revenue; nothing to explain");
            return MmmFit::degenerate(channels, y_mean);
        }

        let Some(solution) = linalg::ridge(features, revenue, self.alpha) else {
            warn!(days = n, columns = p, "Singular MMM system; returning zero coefficients");
            return MmmFit::degenerate(channels, y_mean);
        };

        let ss_res: f64 = revenue
            .iter()
            .zip(solution.fitted.iter())
            .map(|(y, f)| (y - f).powi(2))
            .sum();
        let r2 = 1.0 - ss_res / ss_tot;

        let dof = n as f64 - p as f64 - 1.0;
        let adj_r2 = (dof > 0.0).then(|| 1.0 - (1.0 - r2) * (n as f64 - 1.0) / dof);

        let pct: Vec<f64> = revenue
            .iter()
            .zip(solution.fitted.iter())
            .filter(|(y, _)| y.abs() > f64::EPSILON)
            .map(|(y, f)| ((y - f) / y).abs())
            .collect();
        let mape = (!pct.is_empty()).then(|| pct.iter().sum::<f64>() / pct.len() as f64);

        let coefficients = channels
            .iter()
            .zip(solution.coefficients.iter())
            .map(|(c, b)| (*c, *b))
            .collect();

        MmmFit {
            coefficients,
            intercept: solution.intercept,
            r2: Some(r2),
            adj_r2,
            mape,
        }
    }
}

impl Default for MmmFitter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn two_channel_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 0.5],
            [2.0, 0.1],
            [3.0, 0.9],
            [4.0, 0.3],
            [5.0, 0.7],
            [6.0, 0.2],
        ];
        let y = x.column(0).mapv(|v| 3.0 * v) + x.column(1).mapv(|v| 10.0 * v) + 5.0;
        (x, y)
    }

    #[test]
    fn test_exact_fit_without_penalty() {
        let (x, y) = two_channel_data();
        let fit = MmmFitter::new(0.0).fit(x.view(), y.view(), &[Channel::Meta, Channel::Google]);
        assert!((fit.coefficients[&Channel::Meta] - 3.0).abs() < 1e-8);
        assert!((fit.coefficients[&Channel::Google] - 10.0).abs() < 1e-8);
        assert!((fit.intercept - 5.0).abs() < 1e-8);
        assert!((fit.r2.unwrap() - 1.0).abs() < 1e-9);
        assert!((fit.adj_r2.unwrap() - 1.0).abs() < 1e-9);
        assert!(fit.mape.unwrap() < 1e-9);
    }

    #[test]
    fn test_ridge_penalty_lowers_r2_slightly() {
        let (x, y) = two_channel_data();
        let fit = MmmFitter::new(0.1).fit(x.view(), y.view(), &[Channel::Meta, Channel::Google]);
        let r2 = fit.r2.unwrap();
        assert!(r2 < 1.0 && r2 > 0.9);
    }

    #[test]
    fn test_adj_r2_none_without_degrees_of_freedom() {
        let x = array![[1.0, 3.0], [2.0, 1.0], [3.0, 2.0]];
        let y = array![1.0, 2.0, 4.0];
        let fit = MmmFitter::new(0.1).fit(x.view(), y.view(), &[Channel::Meta, Channel::Google]);
        assert!(fit.r2.is_some());
        assert!(fit.adj_r2.is_none());
    }

    #[test]
    fn test_mismatched_shapes_degrade() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0, 3.0];
        let fit = MmmFitter::default().fit(x.view(), y.view(), &[Channel::Meta]);
        assert!(fit.is_degenerate());
        assert!(fit.coefficients[&Channel::Meta].abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_matrix_degrades() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        let fit = MmmFitter::default().fit(x.view(), y.view(), &[Channel::Meta, Channel::Bing]);
        assert!(fit.is_degenerate());
        assert_eq!(fit.coefficients.len(), 2);
    }

    #[test]
    fn test_constant_revenue_degrades() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![7.0, 7.0, 7.0];
        let fit = MmmFitter::default().fit(x.view(), y.view(), &[Channel::Meta]);
        assert!(fit.r2.is_none());
        assert!((fit.intercept - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_constant_feature_gets_zero() {
        let x = array![[1.0, 2.0], [2.0, 2.0], [3.0, 2.0], [4.0, 2.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let fit = MmmFitter::new(0.0).fit(x.view(), y.view(), &[Channel::Meta, Channel::Bing]);
        assert!(fit.coefficients[&Channel::Bing].abs() < f64::EPSILON);
        assert!((fit.coefficients[&Channel::Meta] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_coefficient_vector_follows_channel_order() {
        let (x, y) = two_channel_data();
        let fit = MmmFitter::new(0.0).fit(x.view(), y.view(), &[Channel::Meta, Channel::Google]);
        let v = fit.coefficient_vector(&[Channel::Google, Channel::Meta]);
        assert!((v[0] - 10.0).abs() < 1e-8);
        assert!((v[1] - 3.0).abs() < 1e-8);
    }
}
