//! Small dense solvers for the normal equations.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Relative pivot size below which the system is treated as singular.
const PIVOT_EPS: f64 = 1e-12;
/// Column variance below which a feature is treated as constant.
const VARIANCE_EPS: f64 = 1e-12;

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.dim() != (n, n) {
        return None;
    }
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() <= PIVOT_EPS * scale {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Indices of the columns of `x` whose variance is above [`VARIANCE_EPS`].
pub(crate) fn varying_columns(x: ArrayView2<f64>) -> Vec<usize> {
    let n = x.nrows();
    if n == 0 {
        return Vec::new();
    }
    (0..x.ncols())
        .filter(|&j| {
            let col = x.column(j);
            let mu = col.sum() / n as f64;
            col.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n as f64 > VARIANCE_EPS
        })
        .collect()
}

/// Ridge fit with an unpenalized intercept.
pub(crate) struct RidgeSolution {
    /// One entry per input column; constant columns get 0.
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub fitted: Array1<f64>,
}

/// Fit `y ≈ intercept + x · beta` minimizing `|y - ŷ|² + alpha |beta|²` on a
/// centered design. Returns `None` for empty or singular problems.
pub(crate) fn ridge(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Option<RidgeSolution> {
    let (n, p) = x.dim();
    if n == 0 || y.len() != n {
        return None;
    }

    let x_mean = x.mean_axis(Axis(0))?;
    let y_mean = y.mean()?;

    let active = varying_columns(x);

    let mut coefficients = Array1::<f64>::zeros(p);
    if !active.is_empty() {
        let mut xc = Array2::<f64>::zeros((n, active.len()));
        for (k, &j) in active.iter().enumerate() {
            for i in 0..n {
                xc[[i, k]] = x[[i, j]] - x_mean[j];
            }
        }
        let yc = y.mapv(|v| v - y_mean);

        let mut gram = xc.t().dot(&xc);
        for k in 0..active.len() {
            gram[[k, k]] += alpha.max(0.0);
        }
        let rhs = xc.t().dot(&yc);
        let beta = solve(gram, rhs)?;
        for (k, &j) in active.iter().enumerate() {
            coefficients[j] = beta[k];
        }
    }

    let intercept = y_mean - x_mean.dot(&coefficients);
    let fitted = x.dot(&coefficients).mapv(|v| v + intercept);
    Some(RidgeSolution {
        coefficients,
        intercept,
        fitted,
    })
}
