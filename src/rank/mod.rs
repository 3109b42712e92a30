//! Ranking strategies.
//!
//! All seven strategies share one [`Ranker`] contract; an index instance is
//! configured with exactly one of them. A query produces a `search_score`
//! (the query-side normalizer), each candidate carries a precomputed
//! `result_score` (written at insert time or by the second pass), and
//! `rank` combines them with the candidate's matched atoms.
//!
//! Scores are nominally 0..=1 but the TF-IDF variants are not strictly
//! bounded; see DESIGN.md for the policy.

mod basic;
mod prefix;
mod tfidf;

pub use basic::{DistanceRanker, EverythingRanker, FMeasureRanker, RecallRanker};
pub use prefix::PrefixRanker;
pub use tfidf::{TfIdfPrefixRanker, TfIdfRanker, idf};

use crate::pairs::Atom;
use crate::tree::SymbolPath;
use ahash::AHashMap;

/// Corpus frequency per atom: how many posting entries the atom has.
pub type AtomFreqs = AHashMap<Atom, usize>;

/// Query-side occurrence paths per atom.
pub type QueryPaths = AHashMap<Atom, Vec<SymbolPath>>;

/// One matched atom on a candidate expression. The occurrence path is only
/// populated for strategies that request it via [`Ranker::fetch_paths`].
#[derive(Debug, Clone)]
pub struct MatchedAtom {
    pub atom: Atom,
    pub path: Option<SymbolPath>,
}

/// A scoring strategy.
///
/// `search_score` may be called without corpus statistics (at insert time,
/// to precompute the per-expression normalizer) or with them (at query
/// time); frequency-weighted strategies fall back to the plain atom count
/// when statistics are absent.
pub trait Ranker: Send + Sync {
    /// Storage key of the per-expression normalizer this strategy reads back.
    fn result_score_key(&self) -> &'static str;

    /// Whether the search path must also retrieve occurrence paths. Costs
    /// one extra batched fetch per query atom.
    fn fetch_paths(&self) -> bool {
        false
    }

    /// Whether every indexed expression is a candidate regardless of
    /// posting-list overlap (the baseline strategy only).
    fn matches_everything(&self) -> bool {
        false
    }

    /// The query-side normalizer / upper bound for a bag of atoms.
    fn search_score(&self, atoms: &[Atom], freqs: Option<&AtomFreqs>, total: Option<usize>)
    -> f64;

    /// Score one candidate.
    fn rank(
        &self,
        matched: &[MatchedAtom],
        search_score: f64,
        result_score: f64,
        freqs: &AtomFreqs,
        total: usize,
        query_paths: &QueryPaths,
    ) -> f64;

    /// Recompute this strategy's per-expression normalizer from frozen
    /// corpus statistics. `None` means the normalizer is
    /// frequency-independent and the second pass leaves it alone.
    fn second_pass_score(&self, atoms: &[Atom], freqs: &AtomFreqs, total: usize) -> Option<f64> {
        let _ = (atoms, freqs, total);
        None
    }
}

/// F-measure style combination with the null-query guard: a zero denominator
/// only occurs for empty queries or empty expressions and scores 0.
pub(crate) fn combine(match_score: f64, search_score: f64, result_score: f64) -> f64 {
    let denominator = search_score + result_score;
    if denominator == 0.0 {
        return 0.0;
    }
    2.0 * match_score / denominator
}

/// Every strategy, used to precompute all normalizers at insert time.
pub fn all_rankers() -> Vec<Box<dyn Ranker>> {
    vec![
        Box::new(FMeasureRanker),
        Box::new(DistanceRanker),
        Box::new(RecallRanker),
        Box::new(PrefixRanker),
        Box::new(TfIdfRanker),
        Box::new(EverythingRanker),
        Box::new(TfIdfPrefixRanker),
    ]
}

/// Strategy names accepted by [`by_name`].
pub const RANKER_NAMES: &[&str] = &[
    "fmeasure",
    "distance",
    "recall",
    "prefix",
    "tfidf",
    "tfidf-prefix",
    "everything",
];

/// Look up a strategy by CLI/config name.
pub fn by_name(name: &str) -> Option<Box<dyn Ranker>> {
    match name {
        "fmeasure" => Some(Box::new(FMeasureRanker)),
        "distance" => Some(Box::new(DistanceRanker)),
        "recall" => Some(Box::new(RecallRanker)),
        "prefix" => Some(Box::new(PrefixRanker)),
        "tfidf" => Some(Box::new(TfIdfRanker)),
        "tfidf-prefix" => Some(Box::new(TfIdfPrefixRanker)),
        "everything" => Some(Box::new(EverythingRanker)),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_guards_null_queries() {
        assert_eq!(combine(0.0, 0.0, 0.0), 0.0);
        assert!((combine(2.0, 3.0, 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn every_name_resolves() {
        for name in RANKER_NAMES {
            assert!(by_name(name).is_some(), "missing ranker {name}");
        }
        assert!(by_name("bm25").is_none());
    }
}
