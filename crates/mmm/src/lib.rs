//! Marketing mix modeling: adstock/saturation features, ridge regression,
//! bootstrap diagnostics, greedy budget allocation and spend simulation.

pub mod diagnostics;
pub mod fitter;
mod linalg;
pub mod optimizer;
pub mod runner;
pub mod simulator;
pub mod transforms;

pub use diagnostics::{ConfidenceInterval, MmmDiagnostics};
pub use fitter::{MmmFit, MmmFitter};
pub use optimizer::{allocate_budget_greedy, predicted_revenue, BudgetOptimizer};
pub use runner::{MmmRunResult, MmmRunner};
pub use simulator::{projected_revenue_delta, RevenueSimulator, SimulationOutcome};
pub use transforms::{adstock, feature_matrix, saturation, ResponseCurve};
