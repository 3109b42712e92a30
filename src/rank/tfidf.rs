//! Frequency-weighted strategies. Both need frozen corpus statistics, so an
//! index using them must run the second pass after bulk ingestion.

use super::prefix::largest_aligned_bucket;
use super::{AtomFreqs, MatchedAtom, QueryPaths, Ranker, combine};
use crate::pairs::Atom;

/// Inverse document frequency of an atom with `count` corpus occurrences in
/// a corpus of `total` expressions. The +1 keeps atoms occurring in every
/// expression from reaching exactly zero.
pub fn idf(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (total as f64 / (count as f64 + 1.0)).log10()
}

fn idf_sum(atoms: &[Atom], freqs: &AtomFreqs, total: usize) -> f64 {
    atoms
        .iter()
        .map(|atom| idf(freqs.get(atom).copied().unwrap_or(0), total))
        .sum()
}

/// F-measure over idf-weighted atom sums, so rare atoms dominate common
/// skeleton pairs like `(=, +)`.
///
/// The combined score is not strictly bounded by 1: a matched atom that is
/// rarer at query time than it was when the result normalizer was cached can
/// push the numerator past the denominator. Callers treat scores as ordinal.
pub struct TfIdfRanker;

impl Ranker for TfIdfRanker {
    fn result_score_key(&self) -> &'static str {
        "tfidf"
    }

    fn search_score(&self, atoms: &[Atom], freqs: Option<&AtomFreqs>, total: Option<usize>) -> f64 {
        match (freqs, total) {
            (Some(freqs), Some(total)) => idf_sum(atoms, freqs, total),
            // No statistics yet: plain count, rewritten by the second pass.
            _ => atoms.len() as f64,
        }
    }

    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        freqs: &AtomFreqs,
        total: usize,
        _: &QueryPaths,
    ) -> f64 {
        let weight: f64 = matched
            .iter()
            .map(|m| idf(freqs.get(&m.atom).copied().unwrap_or(0), total))
            .sum();
        combine(weight, search_score, result_score)
    }

    fn second_pass_score(&self, atoms: &[Atom], freqs: &AtomFreqs, total: usize) -> Option<f64> {
        Some(idf_sum(atoms, freqs, total))
    }
}

/// [`PrefixRanker`](super::PrefixRanker) bucketing with idf weights inside
/// each bucket.
pub struct TfIdfPrefixRanker;

impl Ranker for TfIdfPrefixRanker {
    fn result_score_key(&self) -> &'static str {
        "tfidfprefix"
    }

    fn fetch_paths(&self) -> bool {
        true
    }

    fn search_score(&self, atoms: &[Atom], freqs: Option<&AtomFreqs>, total: Option<usize>) -> f64 {
        match (freqs, total) {
            (Some(freqs), Some(total)) => idf_sum(atoms, freqs, total),
            _ => atoms.len() as f64,
        }
    }

    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        freqs: &AtomFreqs,
        total: usize,
        query_paths: &QueryPaths,
    ) -> f64 {
        let aligned = largest_aligned_bucket(matched, query_paths, |atom| {
            idf(freqs.get(atom).copied().unwrap_or(0), total)
        });
        combine(aligned, search_score, result_score)
    }

    fn second_pass_score(&self, atoms: &[Atom], freqs: &AtomFreqs, total: usize) -> Option<f64> {
        Some(idf_sum(atoms, freqs, total))
    }
}
