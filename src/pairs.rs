//! Structural atom extraction.
//!
//! An [`Atom`] is the indexed unit: an ordered pair of symbol tags plus the
//! horizontal and vertical distance between them. Every symbol acts as the
//! origin exactly once and pairs with each descendant reachable through its
//! relation cone, so the atom bag reflects layout adjacency rather than all
//! node pairs.

use crate::tree::{Relation, Symbol, SymbolPath, SymbolTree};
use ahash::AHashMap;
use std::fmt;

/// An indexed symbol pair with positional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    /// Origin symbol tag.
    pub left: String,
    /// Descendant symbol tag.
    pub right: String,
    /// Relation hops between the two; always >= 1.
    pub h_dist: u32,
    /// Signed vertical offset composed along the path.
    pub v_dist: i32,
}

impl Atom {
    /// Stable storage key, `left|right|h|v` with `|` escaped inside tags.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            escape(&self.left),
            escape(&self.right),
            self.h_dist,
            self.v_dist
        )
    }

    /// Inverse of [`Atom::key`].
    pub fn from_key(key: &str) -> Option<Atom> {
        let mut parts = key.split('|');
        let left = unescape(parts.next()?);
        let right = unescape(parts.next()?);
        let h_dist = parts.next()?.parse().ok()?;
        let v_dist = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Atom {
            left,
            right,
            h_dist,
            v_dist,
        })
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

fn escape(tag: &str) -> String {
    tag.replace('|', "!@!")
}

fn unescape(tag: &str) -> String {
    tag.replace("!@!", "|")
}

/// Visit every (origin, descendant) pair of the subtree at `root`.
///
/// Origins are visited in pre-order following [`Relation::ORDER`]; for each
/// origin, the descendant cone of each child relation is walked with an
/// explicit stack. The closure receives the origin, the descendant, and the
/// accumulated (h, v) offsets. Deterministic: repeated walks visit the same
/// pairs in the same order.
fn for_each_pair<'a>(root: &'a Symbol, f: &mut dyn FnMut(&'a Symbol, &'a Symbol, u32, i32)) {
    let mut origins: Vec<&Symbol> = vec![root];
    while let Some(origin) = origins.pop() {
        for rel in Relation::ORDER {
            let Some(first) = origin.child(rel) else {
                continue;
            };
            let mut cone: Vec<(&Symbol, u32, i32)> = vec![(first, 1, rel.vertical_weight())];
            while let Some((sym, h, v)) = cone.pop() {
                f(origin, sym, h, v);
                for inner in Relation::ORDER.iter().rev() {
                    if let Some(child) = sym.child(*inner) {
                        cone.push((child, h + 1, v + inner.vertical_weight()));
                    }
                }
            }
        }
        // Reversed so origins pop in Relation::ORDER.
        for rel in Relation::ORDER.iter().rev() {
            if let Some(child) = origin.child(*rel) {
                origins.push(child);
            }
        }
    }
}

/// Extract the atom bag of a tree.
pub fn extract(tree: &SymbolTree) -> Vec<Atom> {
    let mut atoms = Vec::with_capacity(tree.num_pairs());
    for_each_pair(tree.root(), &mut |left, right, h, v| {
        atoms.push(Atom {
            left: left.tag().to_string(),
            right: right.tag().to_string(),
            h_dist: h,
            v_dist: v,
        });
    });
    atoms
}

/// Extract atoms together with the structural id of each right-hand symbol.
///
/// Path-aware rankers bucket matches by occurrence path; everything else can
/// use the cheaper [`extract`]. Both walks visit the same atoms in the same
/// order.
pub fn extract_with_paths(tree: &SymbolTree) -> Vec<(Atom, SymbolPath)> {
    let mut pairs = Vec::with_capacity(tree.num_pairs());
    for_each_pair(tree.root(), &mut |left, right, h, v| {
        pairs.push((
            Atom {
                left: left.tag().to_string(),
                right: right.tag().to_string(),
                h_dist: h,
                v_dist: v,
            },
            right.id().clone(),
        ));
    });
    pairs
}

/// Count pairs without materializing them. Used once at tree construction.
pub(crate) fn count(root: &Symbol) -> usize {
    let mut n = 0;
    for_each_pair(root, &mut |_, _, _, _| n += 1);
    n
}

/// The tag multiset of a tree: tag -> occurrence count. The total equals the
/// symbol count, so this view never disagrees with [`SymbolTree::symbols`].
pub fn symbol_multiset(tree: &SymbolTree) -> AHashMap<String, u32> {
    let mut counts = AHashMap::new();
    for (sym, _, _) in tree.symbols() {
        *counts.entry(sym.tag().to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mathml::parse_mathml;

    #[test]
    fn baseline_chain_pairs() {
        // a + b: atoms (a,+,1,0), (a,b,2,0), (+,b,1,0)
        let tree = parse_mathml("<math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>")
            .expect("parse");
        let atoms = extract(&tree);
        assert_eq!(atoms.len(), 3);
        assert!(atoms.contains(&Atom {
            left: "a".into(),
            right: "b".into(),
            h_dist: 2,
            v_dist: 0,
        }));
    }

    #[test]
    fn superscript_contributes_vertical_distance() {
        let tree = parse_mathml("<math><msup><mi>x</mi><mn>2</mn></msup></math>").expect("parse");
        let atoms = extract(&tree);
        assert_eq!(
            atoms,
            vec![Atom {
                left: "x".into(),
                right: "2".into(),
                h_dist: 1,
                v_dist: 1,
            }]
        );
    }

    #[test]
    fn num_pairs_matches_extraction_and_is_restartable() {
        let tree = parse_mathml(
            "<math><mrow><mfrac><mi>x</mi><mn>2</mn></mfrac><mo>+</mo><mi>y</mi></mrow></math>",
        )
        .expect("parse");
        let first = extract(&tree);
        let second = extract(&tree);
        assert_eq!(first, second);
        assert_eq!(first.len(), tree.num_pairs());
        let with_paths = extract_with_paths(&tree);
        let atoms_only: Vec<Atom> = with_paths.into_iter().map(|(a, _)| a).collect();
        assert_eq!(atoms_only, first);
    }

    #[test]
    fn multiset_total_equals_symbol_count() {
        let tree = parse_mathml("<math><mrow><mi>a</mi><mo>+</mo><mi>a</mi></mrow></math>")
            .expect("parse");
        let counts = symbol_multiset(&tree);
        assert_eq!(counts.get("a"), Some(&2));
        let total: u32 = counts.values().sum();
        assert_eq!(total as usize, tree.symbols().count());
    }

    #[test]
    fn atom_key_round_trips_pipe_tags() {
        let atom = Atom {
            left: "|".into(),
            right: "b".into(),
            h_dist: 1,
            v_dist: -1,
        };
        assert_eq!(atom.key(), "!@!|b|1|-1");
        assert_eq!(Atom::from_key(&atom.key()), Some(atom));
    }
}
