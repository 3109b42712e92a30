mod common;

use assert2::check;
use common::tree;
use mathfind::index::{Index, PairIndex};
use mathfind::pairs::Atom;
use mathfind::rank::{self, AtomFreqs, MatchedAtom, QueryPaths, Ranker, idf};
use proptest::prelude::*;
use rstest::rstest;

fn atoms_of(n: usize) -> Vec<Atom> {
    (0..n)
        .map(|i| Atom {
            left: format!("s{i}"),
            right: format!("s{}", i + 1),
            h_dist: (i % 4) as u32 + 1,
            v_dist: (i % 3) as i32 - 1,
        })
        .collect()
}

fn matched_prefix(atoms: &[Atom], n: usize) -> Vec<MatchedAtom> {
    atoms[..n]
        .iter()
        .map(|atom| MatchedAtom {
            atom: atom.clone(),
            path: None,
        })
        .collect()
}

#[rstest]
#[case("fmeasure")]
#[case("distance")]
#[case("recall")]
fn no_match_scores_zero(#[case] name: &str) {
    let ranker = rank::by_name(name).expect("known ranker");
    let atoms = atoms_of(4);
    let q = ranker.search_score(&atoms, None, None);
    let score = ranker.rank(&[], q, 6.0, &AtomFreqs::new(), 10, &QueryPaths::new());
    check!(score == 0.0);
}

#[rstest]
#[case("fmeasure")]
#[case("recall")]
fn empty_query_scores_zero_not_nan(#[case] name: &str) {
    let ranker = rank::by_name(name).expect("known ranker");
    let q = ranker.search_score(&[], None, None);
    let score = ranker.rank(&[], q, 0.0, &AtomFreqs::new(), 0, &QueryPaths::new());
    check!(score == 0.0);
}

proptest! {
    /// Count-based strategies stay within [0, 1] for every clipped
    /// matched/query/result combination.
    #[test]
    fn bounded_strategies_stay_in_unit_interval(
        query_len in 1usize..40,
        result_len in 1usize..40,
        matched_frac in 0.0f64..=1.0,
    ) {
        let atoms = atoms_of(query_len);
        let matched_len =
            ((query_len.min(result_len)) as f64 * matched_frac).floor() as usize;
        let matched = matched_prefix(&atoms, matched_len);

        for name in ["fmeasure", "distance", "recall"] {
            let ranker = rank::by_name(name).expect("known ranker");
            let q = ranker.search_score(&atoms, None, None);
            // The result-side normalizer of an expression holding the
            // matched atoms plus (result_len - matched_len) others.
            let extra = atoms_of(result_len + query_len);
            let result_atoms: Vec<Atom> = atoms[..matched_len]
                .iter()
                .cloned()
                .chain(extra[query_len..query_len + (result_len - matched_len)].iter().cloned())
                .collect();
            let r = ranker.search_score(&result_atoms, None, None);
            let score = ranker.rank(&matched, q, r, &AtomFreqs::new(), 0, &QueryPaths::new());
            prop_assert!(score >= 0.0, "{name} went negative: {score}");
            prop_assert!(score <= 1.0 + 1e-9, "{name} exceeded 1: {score}");
        }
    }

    /// idf never produces NaN or infinities over its whole input range.
    #[test]
    fn idf_is_always_finite(count in 0usize..1_000_000, total in 0usize..1_000_000) {
        prop_assert!(idf(count, total).is_finite());
    }

    /// TF-IDF scores are finite for arbitrary frequency assignments. No
    /// upper bound is asserted: the strategy can legitimately exceed 1 when
    /// query-time frequencies diverge from the cached normalizer.
    #[test]
    fn tfidf_scores_stay_finite(
        query_len in 1usize..20,
        freq_seed in prop::collection::vec(0usize..500, 20),
        total in 1usize..1_000,
    ) {
        let atoms = atoms_of(query_len);
        let mut freqs = AtomFreqs::new();
        for (atom, freq) in atoms.iter().zip(&freq_seed) {
            freqs.insert(atom.clone(), *freq);
        }
        let ranker = rank::by_name("tfidf").expect("known ranker");
        let q = ranker.search_score(&atoms, Some(&freqs), Some(total));
        let matched = matched_prefix(&atoms, query_len);
        // Cached normalizer before any second pass: the plain count.
        let score = ranker.rank(&matched, q, atoms.len() as f64, &freqs, total, &QueryPaths::new());
        prop_assert!(score.is_finite());
    }
}

/// Before the second pass the cached TF-IDF normalizer is a plain atom
/// count, so a full match on rare atoms exceeds 1. The score is accepted
/// as ordinal rather than clamped; the second pass restores the bound.
#[test]
fn tfidf_exceeds_one_before_second_pass_and_settles_after() {
    let mut index = PairIndex::new(rank::by_name("tfidf").expect("known ranker"));
    index
        .add(tree("<math><mrow><mi>q</mi><mo>+</mo><mi>r</mi></mrow></math>"))
        .expect("add");
    // Filler expressions raise the corpus size without sharing any atom.
    for i in 0..28 {
        index
            .add(tree(&format!("<math><mrow><mi>f{i}</mi><mo>!</mo></mrow></math>")))
            .expect("add filler");
    }

    let query = tree("<math><mrow><mi>q</mi><mo>+</mo><mi>r</mi></mrow></math>");
    let before = index.search(&query).expect("search before second pass");
    check!(before.hits[0].score > 1.0, "score was {}", before.hits[0].score);

    index.second_pass().expect("second pass");
    let after = index.search(&query).expect("search after second pass");
    check!((after.hits[0].score - 1.0).abs() < 1e-9);
}

#[test]
fn distance_ranks_tight_matches_above_loose_ones() {
    let mut index = PairIndex::new(rank::by_name("distance").expect("known ranker"));
    index
        .add(tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
        .expect("add");
    index
        .add(tree(
            "<math><mrow><mi>a</mi><mo>+</mo><mi>x</mi><mo>-</mo><mi>b</mi></mrow></math>",
        ))
        .expect("add");

    let outcome = index
        .search(&tree("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>"))
        .expect("search");
    check!(outcome.hits[0].expr_id == 0);
}
