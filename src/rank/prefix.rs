//! Alignment-aware strategy: matches only count together when their
//! occurrence paths align along one consistent substructure.

use super::{AtomFreqs, MatchedAtom, QueryPaths, Ranker, combine};
use crate::pairs::Atom;
use crate::tree::SymbolPath;
use ahash::AHashMap;

/// F-measure where the effective match count is the largest bucket of
/// matches sharing one structural alignment.
///
/// Each match pairs a query occurrence path with a result occurrence path;
/// stripping their longest common suffix leaves the two leading segments that
/// locate the shared substructure in each tree. Matches bucketed under the
/// same segment pair sit inside the same aligned substructure, so taking the
/// largest bucket discards scattered coincidental pair hits.
pub struct PrefixRanker;

pub(super) fn largest_aligned_bucket(
    matched: &[MatchedAtom],
    query_paths: &QueryPaths,
    mut weight: impl FnMut(&Atom) -> f64,
) -> f64 {
    let mut buckets: AHashMap<(SymbolPath, SymbolPath), f64> = AHashMap::new();
    for m in matched {
        let Some(result_path) = &m.path else {
            continue;
        };
        let Some(qpaths) = query_paths.get(&m.atom) else {
            continue;
        };
        for qpath in qpaths {
            *buckets.entry(qpath.align(result_path)).or_insert(0.0) += weight(&m.atom);
        }
    }
    buckets.into_values().fold(0.0, f64::max)
}

impl Ranker for PrefixRanker {
    fn result_score_key(&self) -> &'static str {
        "fmeasure"
    }

    fn fetch_paths(&self) -> bool {
        true
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
        query_paths: &QueryPaths,
    ) -> f64 {
        let aligned = largest_aligned_bucket(matched, query_paths, |_| 1.0);
        combine(aligned, search_score, result_score)
    }
}
