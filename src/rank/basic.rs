//! Count-based strategies: F-measure, distance weighting, recall bias, and
//! the match-everything baseline.

use super::{AtomFreqs, MatchedAtom, QueryPaths, Ranker, combine};
use crate::pairs::Atom;

/// Plain F-measure over matched atom counts. The default strategy.
pub struct FMeasureRanker;

impl Ranker for FMeasureRanker {
    fn result_score_key(&self) -> &'static str {
        "fmeasure"
    }

    fn search_score(&self, atoms: &[Atom], _: Option<&AtomFreqs>, _: Option<usize>) -> f64 {
        atoms.len() as f64
    }

    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        _: &AtomFreqs,
        _: usize,
        _: &QueryPaths,
    ) -> f64 {
        let score = combine(matched.len() as f64, search_score, result_score);
        debug_assert!(score <= 1.0 + 1e-9, "fmeasure out of bounds: {score}");
        score
    }
}

/// F-measure with atoms weighted by inverse horizontal distance, so adjacent
/// symbol pairs count more than distant ones.
pub struct DistanceRanker;

fn inverse_distance(atom: &Atom) -> f64 {
    // h_dist >= 1 by construction.
    1.0 / f64::from(atom.h_dist)
}

impl Ranker for DistanceRanker {
    fn result_score_key(&self) -> &'static str {
        "distance"
    }

    fn search_score(&self, atoms: &[Atom], _: Option<&AtomFreqs>, _: Option<usize>) -> f64 {
        atoms.iter().map(inverse_distance).sum()
    }

    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        _: &AtomFreqs,
        _: usize,
        _: &QueryPaths,
    ) -> f64 {
        let weight: f64 = matched.iter().map(|m| inverse_distance(&m.atom)).sum();
        let score = combine(weight, search_score, result_score);
        debug_assert!(score <= 1.0 + 1e-9, "distance score out of bounds: {score}");
        score
    }
}

/// Recall-biased F-measure: weights the query-side denominator so that
/// expressions containing the whole query outrank partial overlaps.
pub struct RecallRanker;

impl Ranker for RecallRanker {
    fn result_score_key(&self) -> &'static str {
        "fmeasure"
    }

    fn search_score(&self, atoms: &[Atom], _: Option<&AtomFreqs>, _: Option<usize>) -> f64 {
        atoms.len() as f64
    }

    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        _: &AtomFreqs,
        _: usize,
        _: &QueryPaths,
    ) -> f64 {
        let denominator = 2.25 * search_score + result_score;
        if denominator == 0.0 {
            return 0.0;
        }
        let score = 3.25 * matched.len() as f64 / denominator;
        debug_assert!(score <= 1.0 + 1e-9, "recall score out of bounds: {score}");
        score
    }
}

/// Baseline strategy: every indexed expression is a candidate and every
/// candidate scores the same. Useful for eyeballing corpus coverage.
pub struct EverythingRanker;

impl Ranker for EverythingRanker {
    fn result_score_key(&self) -> &'static str {
        "fmeasure"
    }

    fn matches_everything(&self) -> bool {
        true
    }

    fn search_score(&self, atoms: &[Atom], _: Option<&AtomFreqs>, _: Option<usize>) -> f64 {
        atoms.len() as f64
    }

    fn rank(
        &self,
        _: &[MatchedAtom],
        _: f64,
        _: f64,
        _: &AtomFreqs,
        _: usize,
        _: &QueryPaths,
    ) -> f64 {
        1.0
    }
}
