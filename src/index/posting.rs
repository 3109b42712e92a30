//! Storage-backed posting index.
//!
//! The production engine: every posting, expression record, and cached
//! normalizer lives behind the [`Store`] boundary under a flat key schema,
//! so the whole index survives process restarts via store snapshots.
//!
//! Key schema:
//! - `next_expr_id`: id counter
//! - `tree:{repr}`: canonical repr to expression id, for duplicate detection
//! - `expr:{id}:mathml` / `expr:{id}:latex`: display fields
//! - `expr:{id}:doc`: provenance set
//! - `expr:{id}:all_pairs` / `expr:{id}:all_paths`: the expression's atom
//!   bag and occurrence paths, parallel lists
//! - `expr:{id}:{score_key}`: cached per-strategy normalizers
//! - `pair:{atom_key}:exprs` / `pair:{atom_key}:paths`: posting lists, one
//!   entry per occurrence; all occurrences of one expression are contiguous
//! - `all_pairs`: set of every atom key seen

use super::{Index, IndexStats, SearchHit, SearchOutcome, TOP_K};
use crate::error::{Error, Result};
use crate::pairs::{self, Atom};
use crate::provenance::document_link;
use crate::rank::{AtomFreqs, MatchedAtom, QueryPaths, Ranker, all_rankers};
use crate::store::{Store, WriteOp};
use crate::tree::{SymbolPath, SymbolTree};
use ahash::AHashMap;
use rand::Rng;
use std::collections::BTreeMap;

const NEXT_EXPR_ID: &str = "next_expr_id";
const ALL_PAIRS: &str = "all_pairs";

fn expr_key(id: u64, field: &str) -> String {
    format!("expr:{id}:{field}")
}

fn tree_key(repr: &str) -> String {
    format!("tree:{repr}")
}

fn pair_exprs_key(atom_key: &str) -> String {
    format!("pair:{atom_key}:exprs")
}

fn pair_paths_key(atom_key: &str) -> String {
    format!("pair:{atom_key}:paths")
}

fn parse_id(value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Storage(format!("corrupt expression id: {value:?}")))
}

fn parse_score(value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::Storage(format!("corrupt score: {value:?}")))
}

/// A bare expression record, for `random`.
#[derive(Debug, Clone)]
pub struct ExprSummary {
    pub expr_id: u64,
    pub latex: String,
    pub mathml: String,
}

/// Inverted index over a [`Store`], scored by one configured strategy.
///
/// All strategies' normalizers are precomputed at insert time, so the same
/// store can be reopened under a different strategy without reindexing.
pub struct PostingIndex<S: Store> {
    store: S,
    ranker: Box<dyn Ranker>,
}

impl<S: Store> PostingIndex<S> {
    pub fn new(store: S, ranker: Box<dyn Ranker>) -> Self {
        PostingIndex { store, ranker }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn total(&self) -> Result<u64> {
        match self.store.get(NEXT_EXPR_ID)? {
            Some(value) => parse_id(&value),
            None => Ok(0),
        }
    }

    /// Uniform draw over indexed expressions, `None` when the index is empty.
    pub fn random(&self) -> Result<Option<ExprSummary>> {
        let total = self.total()?;
        if total == 0 {
            return Ok(None);
        }
        let expr_id = rand::thread_rng().gen_range(0..total);
        let fields = self.store.get_many(&[
            expr_key(expr_id, "latex"),
            expr_key(expr_id, "mathml"),
        ])?;
        Ok(Some(ExprSummary {
            expr_id,
            latex: fields[0].clone().unwrap_or_default(),
            mathml: fields[1].clone().unwrap_or_default(),
        }))
    }

    /// Drop the whole index.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush_all()
    }

    /// Posting-list lengths in descending order, for capacity planning.
    /// With `only_large`, keep just the lists longer than twice the average.
    pub fn list_sizes(&self, only_large: bool) -> Result<Vec<usize>> {
        let atom_keys = self.store.set_members(ALL_PAIRS)?;
        let posting_keys: Vec<String> =
            atom_keys.iter().map(|key| pair_exprs_key(key)).collect();
        let mut lens = self.store.list_len_many(&posting_keys)?;
        lens.sort_unstable_by(|a, b| b.cmp(a));
        if only_large && !lens.is_empty() {
            let threshold = 2.0 * lens.iter().sum::<usize>() as f64 / lens.len() as f64;
            lens.retain(|&len| len as f64 > threshold);
        }
        Ok(lens)
    }

    fn expression_atoms(&self, id: u64) -> Result<Vec<Atom>> {
        self.store
            .list_range(&expr_key(id, "all_pairs"))?
            .iter()
            .map(|key| {
                Atom::from_key(key)
                    .ok_or_else(|| Error::Storage(format!("corrupt atom key: {key:?}")))
            })
            .collect()
    }

    fn frequencies_for(&self, atoms: &[Atom]) -> Result<AtomFreqs> {
        let mut distinct: Vec<&Atom> = Vec::new();
        let mut seen = AHashMap::new();
        for atom in atoms {
            if seen.insert(atom, ()).is_none() {
                distinct.push(atom);
            }
        }
        let keys: Vec<String> = distinct
            .iter()
            .map(|atom| pair_exprs_key(&atom.key()))
            .collect();
        let lens = self.store.list_len_many(&keys)?;
        let mut freqs = AtomFreqs::new();
        for (atom, len) in distinct.into_iter().zip(lens) {
            freqs.insert(atom.clone(), len);
        }
        Ok(freqs)
    }
}

impl<S: Store> Index for PostingIndex<S> {
    fn add(&mut self, tree: SymbolTree) -> Result<u64> {
        let repr = tree.repr();
        let tree_key = tree_key(&repr);
        // Check-then-act is safe under the single-writer assumption.
        if let Some(existing) = self.store.get(&tree_key)? {
            let id = parse_id(&existing)?;
            if let Some(doc) = tree.document() {
                self.store.set_add(&expr_key(id, "doc"), doc)?;
            }
            tracing::debug!(expr_id = id, "duplicate expression, merged provenance");
            return Ok(id);
        }

        let id = self.store.counter_next(NEXT_EXPR_ID)?;
        let with_paths = pairs::extract_with_paths(&tree);
        let atoms: Vec<Atom> = with_paths.iter().map(|(a, _)| a.clone()).collect();

        let mut ops = vec![
            WriteOp::Set {
                key: tree_key,
                value: id.to_string(),
            },
            WriteOp::Set {
                key: expr_key(id, "mathml"),
                value: tree.mathml().to_string(),
            },
            WriteOp::Set {
                key: expr_key(id, "latex"),
                value: tree.latex().to_string(),
            },
        ];
        if let Some(doc) = tree.document() {
            ops.push(WriteOp::SetAdd {
                key: expr_key(id, "doc"),
                member: doc.to_string(),
            });
        }

        // Every strategy's normalizer, so the store is strategy-agnostic.
        // Strategies sharing a key write the same value.
        let mut scores: BTreeMap<&'static str, f64> = BTreeMap::new();
        for ranker in all_rankers() {
            scores.insert(
                ranker.result_score_key(),
                ranker.search_score(&atoms, None, None),
            );
        }
        for (key, score) in scores {
            ops.push(WriteOp::Set {
                key: expr_key(id, key),
                value: score.to_string(),
            });
        }

        if !with_paths.is_empty() {
            ops.push(WriteOp::ListPush {
                key: expr_key(id, "all_pairs"),
                values: with_paths.iter().map(|(a, _)| a.key()).collect(),
            });
            ops.push(WriteOp::ListPush {
                key: expr_key(id, "all_paths"),
                values: with_paths.iter().map(|(_, p)| p.to_string()).collect(),
            });
        }

        let mut grouped: AHashMap<String, (Vec<String>, Vec<String>)> = AHashMap::new();
        for (atom, path) in &with_paths {
            let entry = grouped.entry(atom.key()).or_default();
            entry.0.push(id.to_string());
            entry.1.push(path.to_string());
        }
        for (atom_key, (ids, occurrence_paths)) in grouped {
            ops.push(WriteOp::SetAdd {
                key: ALL_PAIRS.to_string(),
                member: atom_key.clone(),
            });
            ops.push(WriteOp::ListPush {
                key: pair_exprs_key(&atom_key),
                values: ids,
            });
            ops.push(WriteOp::ListPush {
                key: pair_paths_key(&atom_key),
                values: occurrence_paths,
            });
        }

        self.store.write_batch(ops)?;
        tracing::debug!(expr_id = id, num_pairs = tree.num_pairs(), "indexed expression");
        Ok(id)
    }

    fn search(&self, query: &SymbolTree) -> Result<SearchOutcome> {
        let fetch_paths = self.ranker.fetch_paths();
        let with_paths = pairs::extract_with_paths(query);
        let atoms: Vec<Atom> = with_paths.iter().map(|(a, _)| a.clone()).collect();

        let mut query_counts: AHashMap<&Atom, usize> = AHashMap::new();
        let mut query_paths = QueryPaths::new();
        for (atom, path) in &with_paths {
            *query_counts.entry(atom).or_insert(0) += 1;
            if fetch_paths {
                query_paths
                    .entry(atom.clone())
                    .or_insert_with(Vec::new)
                    .push(path.clone());
            }
        }
        let distinct: Vec<&Atom> = query_counts.keys().copied().collect();

        // One batched read for every query atom's posting list.
        let exprs_keys: Vec<String> = distinct
            .iter()
            .map(|atom| pair_exprs_key(&atom.key()))
            .collect();
        let posting_lists = self.store.list_range_many(&exprs_keys)?;
        let path_lists = if fetch_paths {
            let paths_keys: Vec<String> = distinct
                .iter()
                .map(|atom| pair_paths_key(&atom.key()))
                .collect();
            self.store.list_range_many(&paths_keys)?
        } else {
            Vec::new()
        };

        let total = self.total()? as usize;
        let mut freqs = AtomFreqs::new();
        for (atom, list) in distinct.iter().zip(&posting_lists) {
            freqs.insert((*atom).clone(), list.len());
        }
        let search_score = self.ranker.search_score(&atoms, Some(&freqs), Some(total));

        let mut matched_by_expr: AHashMap<u64, Vec<MatchedAtom>> = AHashMap::new();
        if self.ranker.matches_everything() {
            for id in 0..total as u64 {
                matched_by_expr.entry(id).or_default();
            }
        }
        for (i, atom) in distinct.iter().enumerate() {
            let list = &posting_lists[i];
            let query_count = query_counts[*atom];
            let mut j = 0;
            while j < list.len() {
                let mut k = j;
                while k < list.len() && list[k] == list[j] {
                    k += 1;
                }
                let id = parse_id(&list[j])?;
                let matched = matched_by_expr.entry(id).or_default();
                if fetch_paths {
                    // Path strategies see every occurrence; alignment
                    // bucketing de-duplicates.
                    for entry in j..k {
                        let path = path_lists[i]
                            .get(entry)
                            .and_then(|p| SymbolPath::from_digits(p));
                        matched.push(MatchedAtom {
                            atom: (*atom).clone(),
                            path,
                        });
                    }
                } else {
                    let clipped = query_count.min(k - j);
                    for _ in 0..clipped {
                        matched.push(MatchedAtom {
                            atom: (*atom).clone(),
                            path: None,
                        });
                    }
                }
                j = k;
            }
        }

        // One batched read for every candidate's cached normalizer.
        let ids: Vec<u64> = matched_by_expr.keys().copied().collect();
        let score_keys: Vec<String> = ids
            .iter()
            .map(|&id| expr_key(id, self.ranker.result_score_key()))
            .collect();
        let normalizers = self.store.get_many(&score_keys)?;

        let mut scored: Vec<(u64, f64, usize)> = Vec::with_capacity(ids.len());
        for (id, normalizer) in ids.into_iter().zip(normalizers) {
            let result_score = match normalizer {
                Some(value) => parse_score(&value)?,
                None => 0.0,
            };
            let matched = &matched_by_expr[&id];
            let score = self.ranker.rank(
                matched,
                search_score,
                result_score,
                &freqs,
                total,
                &query_paths,
            );
            scored.push((id, score, matched.len()));
        }
        let candidates = scored.len();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(TOP_K);

        // Display fields only for the survivors.
        let mut hits = Vec::with_capacity(scored.len());
        for (id, score, matched) in scored {
            let fields = self
                .store
                .get_many(&[expr_key(id, "latex"), expr_key(id, "mathml")])?;
            let documents = self.store.set_members(&expr_key(id, "doc"))?;
            hits.push(SearchHit {
                expr_id: id,
                latex: fields[0].clone().unwrap_or_default(),
                mathml: fields[1].clone().unwrap_or_default(),
                score,
                matched,
                links: documents.iter().map(|d| document_link(d)).collect(),
            });
        }
        Ok(SearchOutcome {
            hits,
            candidates,
            atom_freqs: freqs,
        })
    }

    fn second_pass(&mut self) -> Result<()> {
        let total = self.total()?;
        tracing::info!(expressions = total, "second pass: rewriting normalizers");
        for id in 0..total {
            let atoms = self.expression_atoms(id)?;
            let freqs = self.frequencies_for(&atoms)?;
            let mut ops = Vec::new();
            for ranker in all_rankers() {
                if let Some(score) = ranker.second_pass_score(&atoms, &freqs, total as usize) {
                    ops.push(WriteOp::Set {
                        key: expr_key(id, ranker.result_score_key()),
                        value: score.to_string(),
                    });
                }
            }
            if !ops.is_empty() {
                self.store.write_batch(ops)?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats> {
        let atom_keys = self.store.set_members(ALL_PAIRS)?;
        let posting_keys: Vec<String> =
            atom_keys.iter().map(|key| pair_exprs_key(key)).collect();
        let lens = self.store.list_len_many(&posting_keys)?;
        let postings: u64 = lens.iter().map(|&l| l as u64).sum();
        let max = lens.iter().copied().max().unwrap_or(0);
        let terms = atom_keys.len() as u64;
        Ok(IndexStats {
            expressions: self.total()?,
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
