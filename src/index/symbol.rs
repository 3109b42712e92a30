//! In-memory symbol-tag index.
//!
//! A coarser, cheaper signal than atom postings: expressions are matched on
//! their symbol multiset alone, so `a+b` and `b+a` are indistinguishable
//! here. Used standalone for recall-heavy lookups and as the second leg of
//! [`CombinationIndex`](super::CombinationIndex).

use super::{Index, IndexStats, SearchHit, SearchOutcome, sort_and_truncate};
use crate::error::Result;
use crate::pairs::symbol_multiset;
use crate::provenance::document_link;
use crate::rank::AtomFreqs;
use crate::tree::SymbolTree;
use ahash::AHashMap;
use std::collections::BTreeSet;

struct ExprRecord {
    latex: String,
    mathml: String,
    documents: BTreeSet<String>,
    total_symbols: u32,
}

/// Tag-keyed postings over symbol multisets, scored by multiset-overlap
/// F-measure.
pub struct SymbolIndex {
    /// tag -> (expr id, occurrence count).
    postings: AHashMap<String, Vec<(u64, u32)>>,
    exprs: Vec<ExprRecord>,
    by_repr: AHashMap<String, u64>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        SymbolIndex {
            postings: AHashMap::new(),
            exprs: Vec::new(),
            by_repr: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub(super) fn scored(&self, query: &SymbolTree) -> Result<Vec<SearchHit>> {
        let query_counts = symbol_multiset(query);
        let query_total: u32 = query_counts.values().sum();

        let mut overlap: AHashMap<u64, u32> = AHashMap::new();
        for (tag, &query_count) in &query_counts {
            let Some(list) = self.postings.get(tag) else {
                continue;
            };
            for &(id, result_count) in list {
                *overlap.entry(id).or_insert(0) += query_count.min(result_count);
            }
        }

        let mut hits = Vec::with_capacity(overlap.len());
        for (id, matched) in overlap {
            let record = &self.exprs[id as usize];
            let denominator = f64::from(query_total) + f64::from(record.total_symbols);
            let score = if denominator == 0.0 {
                0.0
            } else {
                2.0 * f64::from(matched) / denominator
            };
            hits.push(SearchHit {
                expr_id: id,
                latex: record.latex.clone(),
                mathml: record.mathml.clone(),
                score,
                matched: matched as usize,
                links: record.documents.iter().map(|d| document_link(d)).collect(),
            });
        }
        Ok(hits)
    }
}

impl Default for SymbolIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Index for SymbolIndex {
    fn add(&mut self, tree: SymbolTree) -> Result<u64> {
        let repr = tree.repr();
        if let Some(&id) = self.by_repr.get(&repr) {
            if let Some(doc) = tree.document() {
                self.exprs[id as usize].documents.insert(doc.to_string());
            }
            return Ok(id);
        }

        let id = self.exprs.len() as u64;
        let counts = symbol_multiset(&tree);
        let total_symbols = counts.values().sum();
        for (tag, count) in counts {
            self.postings.entry(tag).or_default().push((id, count));
        }

        let mut documents = BTreeSet::new();
        if let Some(doc) = tree.document() {
            documents.insert(doc.to_string());
        }
        self.by_repr.insert(repr, id);
        self.exprs.push(ExprRecord {
            latex: tree.latex().to_string(),
            mathml: tree.mathml().to_string(),
            documents,
            total_symbols,
        });
        Ok(id)
    }

    fn search(&self, query: &SymbolTree) -> Result<SearchOutcome> {
        let mut hits = self.scored(query)?;
        let candidates = hits.len();
        sort_and_truncate(&mut hits);
        Ok(SearchOutcome {
            hits,
            candidates,
            atom_freqs: AtomFreqs::new(),
        })
    }

    fn stats(&self) -> Result<IndexStats> {
        let postings: u64 = self.postings.values().map(|l| l.len() as u64).sum();
        let max = self.postings.values().map(Vec::len).max().unwrap_or(0);
        let terms = self.postings.len() as u64;
        Ok(IndexStats {
            expressions: self.exprs.len() as u64,
            terms,
            postings,
            max_posting_len: max,
            avg_posting_len: if terms == 0 {
                0.0
            } else {
                postings as f64 / terms as f64
            },
        })
    }
}
