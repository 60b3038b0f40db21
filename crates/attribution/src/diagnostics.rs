//! Attribution run diagnostics: path sufficiency and split-half stability.

use crate::markov::{MarkovAttributor, TouchPath};
use marketmix_core::types::Channel;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Smallest half-sample that still yields a meaningful Markov fit.
const MIN_HALF_PATHS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionDiagnostics {
    pub path_count: usize,
    pub channel_count: usize,
    /// `min(1, path_count / target_paths)`.
    pub sufficiency: f64,
    /// `1 - L1/2` between credits fitted on two random half-samples.
    pub stability: f64,
    pub subsample_l1: Option<f64>,
    pub confidence_score: f64,
}

/// Score how much the attribution run can be trusted.
///
/// Confidence is the product of path sufficiency and split-half stability,
/// so a small sample yields low confidence whatever the point estimate.
pub fn run_diagnostics(
    paths: &[TouchPath],
    channels: &[Channel],
    target_paths: usize,
    seed: u64,
) -> AttributionDiagnostics {
    let path_count = paths.len();
    let sufficiency = if target_paths == 0 {
        1.0
    } else {
        (path_count as f64 / target_paths as f64).min(1.0)
    };

    let subsample_l1 = split_half_distance(paths, channels, seed);
    let stability = subsample_l1
        .map(|l1| (1.0 - l1 / 2.0).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    AttributionDiagnostics {
        path_count,
        channel_count: channels.len(),
        sufficiency,
        stability,
        subsample_l1,
        confidence_score: (sufficiency * stability).clamp(0.0, 1.0),
    }
}

fn split_half_distance(paths: &[TouchPath], channels: &[Channel], seed: u64) -> Option<f64> {
    if paths.len() < 2 * MIN_HALF_PATHS {
        return None;
    }

    let mut order: Vec<usize> = (0..paths.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let (left, right) = order.split_at(paths.len() / 2);
    let pick = |idx: &[usize]| -> Vec<TouchPath> {
        idx.iter().map(|i| paths[*i].clone()).collect()
    };

    let markov = MarkovAttributor::new(MIN_HALF_PATHS);
    let a = markov.credits(&pick(left), channels)?;
    let b = markov.credits(&pick(right), channels)?;

    let keys: BTreeSet<Channel> = a.keys().chain(b.keys()).copied().collect();
    Some(
        keys.iter()
            .map(|c| {
                (a.get(c).copied().unwrap_or(0.0) - b.get(c).copied().unwrap_or(0.0)).abs()
            })
            .sum(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_paths(n: usize) -> Vec<TouchPath> {
        (0..n)
            .map(|i| match i % 3 {
                0 => TouchPath::converted(vec![Channel::Meta]),
                1 => TouchPath::converted(vec![Channel::Google, Channel::Meta]),
                _ => TouchPath {
                    channels: vec![Channel::Google],
                    converted: false,
                },
            })
            .collect()
    }

    #[test]
    fn test_empty_paths_have_zero_confidence() {
        let d = run_diagnostics(&[], &[Channel::Meta], 100, 1);
        assert_eq!(d.path_count, 0);
        assert!(d.subsample_l1.is_none());
        assert!(d.confidence_score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_low_path_count_caps_confidence() {
        let paths = vec![TouchPath::converted(vec![Channel::Meta, Channel::Google]); 10];
        let d = run_diagnostics(&paths, &[Channel::Meta, Channel::Google], 100, 1);
        // Identical halves are perfectly stable, but only 10 of 100 paths.
        assert!((d.stability - 1.0).abs() < 1e-9);
        assert!((d.confidence_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_large_consistent_sample_is_confident() {
        let paths = mixed_paths(300);
        let d = run_diagnostics(&paths, &[Channel::Meta, Channel::Google], 100, 11);
        assert!((d.sufficiency - 1.0).abs() < f64::EPSILON);
        assert!(d.stability > 0.8);
        assert!(d.confidence_score > 0.8 && d.confidence_score <= 1.0);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let paths = mixed_paths(40);
        let a = run_diagnostics(&paths, &[Channel::Meta, Channel::Google], 100, 5);
        let b = run_diagnostics(&paths, &[Channel::Meta, Channel::Google], 100, 5);
        assert_eq!(a, b);
    }
}
