//! In-memory atom-posting index.

use super::{Index, IndexStats, SearchHit, SearchOutcome, sort_and_truncate};
use crate::error::Result;
use crate::pairs::{self, Atom};
use crate::provenance::document_link;
use crate::rank::{AtomFreqs, MatchedAtom, QueryPaths, Ranker};
use crate::tree::{SymbolPath, SymbolTree};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeSet;

struct ExprRecord {
    tree: SymbolTree,
    atoms: Vec<Atom>,
    documents: BTreeSet<String>,
    result_score: f64,
}

/// Atom postings held in process memory, scored by one configured strategy.
pub struct PairIndex {
    ranker: Box<dyn Ranker>,
    /// atom -> (expr id, occurrence count), one entry per expression.
    postings: AHashMap<Atom, Vec<(u64, u32)>>,
    /// atom -> expr id -> occurrence paths, parallel to `postings` counts.
    paths: AHashMap<Atom, AHashMap<u64, Vec<SymbolPath>>>,
    exprs: Vec<ExprRecord>,
    by_repr: AHashMap<String, u64>,
}

impl PairIndex {
    pub fn new(ranker: Box<dyn Ranker>) -> Self {
        PairIndex {
            ranker,
            postings: AHashMap::new(),
            paths: AHashMap::new(),
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

    /// Posting-list lengths in descending order, for capacity planning.
    /// With `only_large`, keep just the lists longer than twice the average.
    pub fn list_sizes(&self, only_large: bool) -> Vec<usize> {
        let mut lens: Vec<usize> = self.postings.values().map(Vec::len).collect();
        lens.sort_unstable_by(|a, b| b.cmp(a));
        if only_large && !lens.is_empty() {
            let threshold = 2.0 * lens.iter().sum::<usize>() as f64 / lens.len() as f64;
            lens.retain(|&len| len as f64 > threshold);
        }
        lens
    }

    /// Total corpus occurrences of one atom.
    fn corpus_frequency(&self, atom: &Atom) -> usize {
        self.postings
            .get(atom)
            .map(|list| list.iter().map(|(_, count)| *count as usize).sum())
            .unwrap_or(0)
    }

    /// Score every candidate without truncation, so ensembles can merge
    /// complete lists by expression id.
    pub(super) fn scored(&self, query: &SymbolTree) -> Result<(Vec<SearchHit>, AtomFreqs)> {
        let fetch_paths = self.ranker.fetch_paths();
        let with_paths = pairs::extract_with_paths(query);

        let mut query_counts: AHashMap<&Atom, u32> = AHashMap::new();
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

        let mut freqs = AtomFreqs::new();
        for atom in query_counts.keys() {
            freqs.insert((*atom).clone(), self.corpus_frequency(atom));
        }
        let total = self.exprs.len();
        let atoms: Vec<Atom> = with_paths.iter().map(|(a, _)| a.clone()).collect();
        let search_score = self.ranker.search_score(&atoms, Some(&freqs), Some(total));

        let mut matched_by_expr: AHashMap<u64, Vec<MatchedAtom>> = AHashMap::new();
        if self.ranker.matches_everything() {
            for id in 0..self.exprs.len() as u64 {
                matched_by_expr.entry(id).or_default();
            }
        }
        for (atom, &query_count) in &query_counts {
            let Some(list) = self.postings.get(*atom) else {
                continue;
            };
            for &(id, result_count) in list {
                let matched = matched_by_expr.entry(id).or_default();
                if fetch_paths {
                    // Path strategies see every occurrence; the alignment
                    // buckets do their own de-duplication.
                    let occurrence_paths = self
                        .paths
                        .get(*atom)
                        .and_then(|by_expr| by_expr.get(&id))
                        .map(|p| p.as_slice())
                        .unwrap_or(&[]);
                    for path in occurrence_paths {
                        matched.push(MatchedAtom {
                            atom: (*atom).clone(),
                            path: Some(path.clone()),
                        });
                    }
                } else {
                    let clipped = query_count.min(result_count);
                    for _ in 0..clipped {
                        matched.push(MatchedAtom {
                            atom: (*atom).clone(),
                            path: None,
                        });
                    }
                }
            }
        }

        let mut hits = Vec::with_capacity(matched_by_expr.len());
        for (id, matched) in matched_by_expr {
            let record = &self.exprs[id as usize];
            let score = self.ranker.rank(
                &matched,
                search_score,
                record.result_score,
                &freqs,
                total,
                &query_paths,
            );
            hits.push(SearchHit {
                expr_id: id,
                latex: record.tree.latex().to_string(),
                mathml: record.tree.mathml().to_string(),
                score,
                matched: matched.len(),
                links: record.documents.iter().map(|d| document_link(d)).collect(),
            });
        }
        Ok((hits, freqs))
    }
}

impl Index for PairIndex {
    fn add(&mut self, tree: SymbolTree) -> Result<u64> {
        let repr = tree.repr();
        if let Some(&id) = self.by_repr.get(&repr) {
            if let Some(doc) = tree.document() {
                self.exprs[id as usize].documents.insert(doc.to_string());
            }
            return Ok(id);
        }

        let id = self.exprs.len() as u64;
        let with_paths = pairs::extract_with_paths(&tree);
        let atoms: Vec<Atom> = with_paths.iter().map(|(a, _)| a.clone()).collect();

        let mut counts: AHashMap<&Atom, u32> = AHashMap::new();
        for (atom, path) in &with_paths {
            *counts.entry(atom).or_insert(0) += 1;
            self.paths
                .entry(atom.clone())
                .or_default()
                .entry(id)
                .or_default()
                .push(path.clone());
        }
        for (atom, count) in counts {
            self.postings
                .entry(atom.clone())
                .or_default()
                .push((id, count));
        }

        let result_score = self.ranker.search_score(&atoms, None, None);
        let mut documents = BTreeSet::new();
        if let Some(doc) = tree.document() {
            documents.insert(doc.to_string());
        }
        self.by_repr.insert(repr, id);
        self.exprs.push(ExprRecord {
            tree,
            atoms,
            documents,
            result_score,
        });
        Ok(id)
    }

    fn search(&self, query: &SymbolTree) -> Result<SearchOutcome> {
        let (mut hits, atom_freqs) = self.scored(query)?;
        let candidates = hits.len();
        sort_and_truncate(&mut hits);
        Ok(SearchOutcome {
            hits,
            candidates,
            atom_freqs,
        })
    }

    fn second_pass(&mut self) -> Result<()> {
        let total = self.exprs.len();
        let distinct: AHashSet<&Atom> = self.exprs.iter().flat_map(|r| r.atoms.iter()).collect();
        let mut freqs = AtomFreqs::new();
        for atom in distinct {
            freqs.insert(atom.clone(), self.corpus_frequency(atom));
        }
        let mut rewritten = Vec::with_capacity(total);
        for record in &self.exprs {
            rewritten.push(self.ranker.second_pass_score(&record.atoms, &freqs, total));
        }
        for (record, score) in self.exprs.iter_mut().zip(rewritten) {
            if let Some(score) = score {
                record.result_score = score;
            }
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mathml::parse_mathml;
    use crate::rank;
    use assert2::check;

    fn index(ranker: &str) -> PairIndex {
        PairIndex::new(rank::by_name(ranker).expect("known ranker"))
    }

    fn tree(markup: &str) -> SymbolTree {
        parse_mathml(markup).expect("parse")
    }

    #[test]
    fn self_query_is_the_top_hit_with_full_match() {
        let mut idx = index("fmeasure");
        let query = tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>");
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
            .unwrap();
        idx.add(tree("<math><mrow><mi>a</mi><mo>-</mo><mi>b</mi></mrow></math>"))
            .unwrap();

        let outcome = idx.search(&query).unwrap();
        let top = &outcome.hits[0];
        check!(top.expr_id == 0);
        check!((top.score - 1.0).abs() < 1e-12);
        check!(top.matched == query.num_pairs());
    }

    #[test]
    fn duplicate_markup_merges_provenance() {
        let mut idx = index("fmeasure");
        let mut first = tree("<math><mrow><mi>x</mi><mo>+</mo><mi>y</mi></mrow></math>");
        first.set_document("a.mml");
        // Different source text, identical layout.
        let mut second =
            tree("<math><mrow><mi>x</mi><mrow><mo>+</mo><mi>y</mi></mrow></mrow></math>");
        second.set_document("b.mml");

        let id1 = idx.add(first).unwrap();
        let id2 = idx.add(second).unwrap();
        check!(id1 == id2);
        check!(idx.len() == 1);
        check!(idx.exprs[0].documents.len() == 2);
    }

    #[test]
    fn unmatched_query_returns_no_hits() {
        let mut idx = index("fmeasure");
        idx.add(tree("<math><mi>a</mi></math>")).unwrap();
        let outcome = idx
            .search(&tree("<math><mrow><mi>p</mi><mo>+</mo><mi>q</mi></mrow></math>"))
            .unwrap();
        check!(outcome.hits.is_empty());
        check!(outcome.candidates == 0);
    }

    #[test]
    fn everything_ranker_returns_all_expressions() {
        let mut idx = index("everything");
        idx.add(tree("<math><mi>a</mi></math>")).unwrap();
        idx.add(tree("<math><mi>b</mi></math>")).unwrap();
        let outcome = idx.search(&tree("<math><mi>z</mi></math>")).unwrap();
        check!(outcome.candidates == 2);
        check!(outcome.hits.iter().all(|h| h.score == 1.0));
    }

    #[test]
    fn pythagorean_scenario_under_fmeasure() {
        let sup = |base: &str, exp: &str| {
            format!("<msup><mi>{base}</mi><mn>{exp}</mn></msup>")
        };
        let formula = |a: &str, b: &str, c: &str, n: &str| {
            format!(
                "<math><mrow>{}<mo>+</mo>{}<mo>=</mo>{}</mrow></math>",
                sup(a, n),
                sup(b, n),
                sup(c, n)
            )
        };
        let mut idx = index("fmeasure");
        let target = idx.add(tree(&formula("a", "b", "c", "2"))).unwrap();
        idx.add(tree(&formula("a", "b", "c", "3"))).unwrap();
        idx.add(tree(&formula("x", "y", "z", "2"))).unwrap();

        let outcome = idx.search(&tree(&formula("a", "b", "c", "2"))).unwrap();
        check!(outcome.hits[0].expr_id == target);
        check!((outcome.hits[0].score - 1.0).abs() < 1e-12);
        check!(outcome.hits[0].score > outcome.hits[1].score);
        check!(outcome.candidates == 3);
    }

    #[test]
    fn list_sizes_sorts_descending_and_filters_small() {
        let mut idx = index("fmeasure");
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
            .unwrap();
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>c</mi></mrow></math>"))
            .unwrap();
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>d</mi></mrow></math>"))
            .unwrap();

        let sizes = idx.list_sizes(false);
        check!(sizes.first() == Some(&3));
        check!(sizes.windows(2).all(|w| w[0] >= w[1]));
        check!(idx.list_sizes(true) == vec![3]);
    }

    #[test]
    fn second_pass_rewrites_tfidf_normalizers_idempotently() {
        let mut idx = index("tfidf");
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
            .unwrap();
        idx.add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>c</mi></mrow></math>"))
            .unwrap();

        let before: Vec<f64> = idx.exprs.iter().map(|r| r.result_score).collect();
        idx.second_pass().unwrap();
        let once: Vec<f64> = idx.exprs.iter().map(|r| r.result_score).collect();
        check!(once != before);
        idx.second_pass().unwrap();
        let twice: Vec<f64> = idx.exprs.iter().map(|r| r.result_score).collect();
        check!(once == twice);
    }

    #[test]
    fn prefix_ranker_prefers_consistent_substructure() {
        let mut idx = index("prefix");
        // The query appears intact inside the first expression and split
        // across unrelated branches in the second.
        idx.add(tree(
            "<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi><mo>=</mo><mi>c</mi></mrow></math>",
        ))
        .unwrap();
        idx.add(tree(
            "<math><mrow><mfrac><mi>a</mi><mi>b</mi></mfrac><mo>+</mo><mi>b</mi></mrow></math>",
        ))
        .unwrap();
        let outcome = idx
            .search(&tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
            .unwrap();
        check!(outcome.hits[0].expr_id == 0);
    }
}
