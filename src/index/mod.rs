//! Inverted index engines.
//!
//! Four implementations share the [`Index`] contract: [`PairIndex`] (atom
//! postings in memory), [`SymbolIndex`] (coarser tag postings),
//! [`CombinationIndex`] (linear ensemble of the two), and
//! [`PostingIndex`] (the storage-backed engine the CLI runs).

mod combination;
mod pair;
mod posting;
mod symbol;

pub use combination::CombinationIndex;
pub use pair::PairIndex;
pub use posting::{ExprSummary, PostingIndex};
pub use symbol::SymbolIndex;

use crate::corpus::{self, IngestStats};
use crate::error::Result;
use crate::mathml::{TexConverter, parse_mathml, parse_tex};
use crate::provenance::Link;
use crate::rank::AtomFreqs;
use crate::tree::SymbolTree;
use serde::Serialize;
use std::path::Path;

/// Results returned per query.
pub const TOP_K: usize = 10;

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub expr_id: u64,
    pub latex: String,
    pub mathml: String,
    pub score: f64,
    /// Matched atom count, for display alongside the score. Count strategies
    /// clip to the per-atom minimum of query and result occurrences;
    /// path-fetching strategies count every retrieved occurrence.
    pub matched: usize,
    pub links: Vec<Link>,
}

/// A full query response: the top hits plus corpus-side context.
#[derive(Debug)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Expressions that shared at least one posting with the query.
    pub candidates: usize,
    /// Corpus frequency of each query atom at query time.
    pub atom_freqs: AtomFreqs,
}

/// Corpus-level counters reported by `stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub expressions: u64,
    /// Distinct posting keys.
    pub terms: u64,
    /// Total posting entries across all keys.
    pub postings: u64,
    pub max_posting_len: usize,
    pub avg_posting_len: f64,
}

/// The index capability. `add_directory` and the text-query entry points are
/// provided on top of `add`/`search`.
pub trait Index {
    /// Index one expression, returning its id. Structurally identical
    /// expressions share one id; re-adding merges provenance only.
    fn add(&mut self, tree: SymbolTree) -> Result<u64>;

    fn add_all(&mut self, trees: Vec<SymbolTree>) -> Result<()> {
        for tree in trees {
            self.add(tree)?;
        }
        Ok(())
    }

    /// Ingest a corpus directory, recovering from per-expression failures.
    fn add_directory(
        &mut self,
        dir: &Path,
        converter: Option<&dyn TexConverter>,
    ) -> Result<IngestStats>
    where
        Self: Sized,
    {
        let mut stats = IngestStats::default();
        corpus::walk(dir, converter, &mut stats, &mut |tree| {
            self.add(tree).map(|_| ())
        })?;
        Ok(stats)
    }

    fn search(&self, query: &SymbolTree) -> Result<SearchOutcome>;

    fn search_mathml(&self, markup: &str) -> Result<SearchOutcome> {
        self.search(&parse_mathml(markup)?)
    }

    fn search_tex(&self, tex: &str, converter: &dyn TexConverter) -> Result<SearchOutcome> {
        self.search(&parse_tex(tex, converter)?)
    }

    /// Recompute frequency-dependent normalizers from frozen posting lists.
    /// A no-op for engines or strategies that keep none.
    fn second_pass(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats>;
}

/// Order by score descending, expression id ascending, and keep [`TOP_K`].
pub(crate) fn sort_and_truncate(hits: &mut Vec<SearchHit>) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.expr_id.cmp(&b.expr_id))
    });
    hits.truncate(TOP_K);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(expr_id: u64, score: f64) -> SearchHit {
        SearchHit {
            expr_id,
            latex: String::new(),
            mathml: String::new(),
            score,
            matched: 0,
            links: Vec::new(),
        }
    }

    #[test]
    fn ties_break_toward_lower_expression_ids() {
        let mut hits = vec![hit(7, 0.5), hit(2, 0.5), hit(4, 0.9)];
        sort_and_truncate(&mut hits);
        let ids: Vec<u64> = hits.iter().map(|h| h.expr_id).collect();
        assert_eq!(ids, vec![4, 2, 7]);
    }

    #[test]
    fn truncates_to_top_k() {
        let mut hits: Vec<SearchHit> = (0..25).map(|i| hit(i, i as f64)).collect();
        sort_and_truncate(&mut hits);
        assert_eq!(hits.len(), TOP_K);
        assert_eq!(hits[0].expr_id, 24);
    }
}
