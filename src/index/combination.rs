//! Linear ensemble of the atom and symbol indices.

use super::{Index, IndexStats, PairIndex, SearchHit, SearchOutcome, SymbolIndex, sort_and_truncate};
use crate::error::Result;
use crate::rank::Ranker;
use crate::tree::SymbolTree;
use ahash::AHashMap;

/// Feeds every expression to both sub-indices and sums their scores per
/// expression on search. Unweighted; the atom leg carries the configured
/// strategy, the symbol leg always scores multiset F-measure.
pub struct CombinationIndex {
    pairs: PairIndex,
    symbols: SymbolIndex,
}

impl CombinationIndex {
    pub fn new(ranker: Box<dyn Ranker>) -> Self {
        CombinationIndex {
            pairs: PairIndex::new(ranker),
            symbols: SymbolIndex::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl Index for CombinationIndex {
    fn add(&mut self, tree: SymbolTree) -> Result<u64> {
        let id = self.pairs.add(tree.clone())?;
        let symbol_id = self.symbols.add(tree)?;
        // Both legs deduplicate by canonical repr, so ids stay aligned.
        debug_assert_eq!(id, symbol_id);
        Ok(id)
    }

    fn search(&self, query: &SymbolTree) -> Result<SearchOutcome> {
        let (pair_hits, atom_freqs) = self.pairs.scored(query)?;
        let symbol_hits = self.symbols.scored(query)?;

        let mut merged: AHashMap<u64, SearchHit> = AHashMap::new();
        for hit in pair_hits.into_iter().chain(symbol_hits) {
            match merged.entry(hit.expr_id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.score += hit.score;
                    existing.matched = existing.matched.max(hit.matched);
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(hit);
                }
            }
        }

        let mut hits: Vec<SearchHit> = merged.into_values().collect();
        let candidates = hits.len();
        sort_and_truncate(&mut hits);
        Ok(SearchOutcome {
            hits,
            candidates,
            atom_freqs,
        })
    }

    fn second_pass(&mut self) -> Result<()> {
        self.pairs.second_pass()
    }

    fn stats(&self) -> Result<IndexStats> {
        // The atom leg is the finer-grained of the two; report it.
        self.pairs.stats()
    }
}
