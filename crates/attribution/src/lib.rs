//! Revenue attribution: click-ID credit, spend-share fractional allocation,
//! Markov removal-effect refinement and run diagnostics.

pub mod click;
pub mod diagnostics;
pub mod fractional;
pub mod markov;
pub mod runner;

pub use click::{ClickAttribution, ClickAttributor};
pub use diagnostics::{run_diagnostics, AttributionDiagnostics};
pub use fractional::FractionalAllocator;
pub use markov::{synthesize_paths, MarkovAttributor, TouchPath};
pub use runner::{AttributionOptions, AttributionRunReport, AttributionRunner};
