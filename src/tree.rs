//! Symbol layout trees.
//!
//! A [`SymbolTree`] encodes the two-dimensional visual layout of a
//! mathematical expression: a baseline sequence of symbols with optional
//! superscript-like, subscript-like, and radicand branches. It deliberately
//! ignores operator semantics; `x^2` and `x²` rendered the same way produce
//! the same tree.
//!
//! Trees are built by the parsers in [`crate::mathml`] and are immutable
//! afterwards. Every node carries a structural id (the relation-code path
//! from the root), which lets rankers align occurrences across trees.

use std::fmt;

/// An outgoing relation from a symbol to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Same baseline, to the right.
    Next,
    /// Superscript, overscript, or numerator.
    Above,
    /// Subscript, underscript, or denominator.
    Below,
    /// Radicand of a root.
    Within,
}

impl Relation {
    /// Child visit order used everywhere traversal order matters.
    pub const ORDER: [Relation; 4] = [
        Relation::Above,
        Relation::Next,
        Relation::Below,
        Relation::Within,
    ];

    /// One-digit structural-id code.
    pub const fn code(self) -> u8 {
        match self {
            Relation::Next => 0,
            Relation::Above => 1,
            Relation::Below => 2,
            Relation::Within => 3,
        }
    }

    /// Signed vertical weight accumulated along extraction paths.
    pub const fn vertical_weight(self) -> i32 {
        match self {
            Relation::Above => 1,
            Relation::Below => -1,
            Relation::Next | Relation::Within => 0,
        }
    }
}

/// The relation-code path from the root to a symbol, e.g. `[0, 1]` for the
/// `above` child of the root. Uniquely locates a symbol within its tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolPath(Vec<u8>);

impl SymbolPath {
    /// The root id, `[0]`.
    pub fn root() -> Self {
        SymbolPath(vec![0])
    }

    /// The id of the child reached through `rel`.
    pub fn child(&self, rel: Relation) -> Self {
        let mut codes = self.0.clone();
        codes.push(rel.code());
        SymbolPath(codes)
    }

    pub fn codes(&self) -> &[u8] {
        &self.0
    }

    /// Parse the digit-string form produced by `Display`.
    pub fn from_digits(s: &str) -> Option<Self> {
        s.chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .map(SymbolPath)
    }

    /// Length of the longest common suffix with `other`.
    pub fn common_suffix_len(&self, other: &SymbolPath) -> usize {
        self.0
            .iter()
            .rev()
            .zip(other.0.iter().rev())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Split off the longest common suffix, returning the two leading
    /// segments. Two occurrence paths that align along the same substructure
    /// produce the same pair, which is what the prefix rankers bucket on.
    pub fn align(&self, other: &SymbolPath) -> (SymbolPath, SymbolPath) {
        let k = self.common_suffix_len(other);
        (
            SymbolPath(self.0[..self.0.len() - k].to_vec()),
            SymbolPath(other.0[..other.0.len() - k].to_vec()),
        )
    }
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{code}")?;
        }
        Ok(())
    }
}

/// A node in a symbol layout tree.
///
/// At most one parent reaches a symbol through exactly one relation; there is
/// no sharing between trees. Relations are assigned during parsing and never
/// change afterwards.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub(crate) tag: String,
    pub(crate) next: Option<Box<Symbol>>,
    pub(crate) above: Option<Box<Symbol>>,
    pub(crate) below: Option<Box<Symbol>>,
    pub(crate) within: Option<Box<Symbol>>,
    pub(crate) id: SymbolPath,
}

impl Symbol {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Symbol {
            tag: tag.into(),
            next: None,
            above: None,
            below: None,
            within: None,
            id: SymbolPath::default(),
        }
    }

    /// The symbol's label, e.g. `"x"`, `"+"`, `"frac"`, `"root2"`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The structural id assigned at tree construction.
    pub fn id(&self) -> &SymbolPath {
        &self.id
    }

    pub fn child(&self, rel: Relation) -> Option<&Symbol> {
        match rel {
            Relation::Next => self.next.as_deref(),
            Relation::Above => self.above.as_deref(),
            Relation::Below => self.below.as_deref(),
            Relation::Within => self.within.as_deref(),
        }
    }

    fn child_mut(&mut self, rel: Relation) -> Option<&mut Symbol> {
        match rel {
            Relation::Next => self.next.as_deref_mut(),
            Relation::Above => self.above.as_deref_mut(),
            Relation::Below => self.below.as_deref_mut(),
            Relation::Within => self.within.as_deref_mut(),
        }
    }

    fn assign_ids(&mut self, prefix: SymbolPath) {
        for rel in Relation::ORDER {
            let child_id = prefix.child(rel);
            if let Some(child) = self.child_mut(rel) {
                child.assign_ids(child_id);
            }
        }
        self.id = prefix;
    }

    fn build_repr(&self, out: &mut String) {
        out.push('(');
        out.push_str(&self.tag);
        for (rel, name) in [
            (Relation::Next, "next"),
            (Relation::Above, "above"),
            (Relation::Below, "below"),
            (Relation::Within, "within"),
        ] {
            if let Some(child) = self.child(rel) {
                out.push(',');
                out.push_str(name);
                out.push('=');
                child.build_repr(out);
            }
        }
        out.push(')');
    }
}

/// Explicit-stack iterator over a symbol subtree.
///
/// Yields `(symbol, h_dist, v_dist)` where `h_dist` counts relation hops from
/// the start symbol and `v_dist` accumulates signed vertical weight along the
/// path. The explicit stack keeps deep baselines from exhausting the call
/// stack, and the fixed push order makes iteration deterministic and
/// restartable.
pub struct SymbolIterator<'a> {
    stack: Vec<(&'a Symbol, u32, i32)>,
}

impl<'a> SymbolIterator<'a> {
    pub(crate) fn new(start: &'a Symbol) -> Self {
        SymbolIterator {
            stack: vec![(start, 0, 0)],
        }
    }
}

impl<'a> Iterator for SymbolIterator<'a> {
    type Item = (&'a Symbol, u32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        let (sym, h, v) = self.stack.pop()?;
        // Reversed so the pop order follows Relation::ORDER.
        for rel in Relation::ORDER.iter().rev() {
            if let Some(child) = sym.child(*rel) {
                self.stack.push((child, h + 1, v + rel.vertical_weight()));
            }
        }
        Some((sym, h, v))
    }
}

/// A parsed expression: the root symbol plus display and provenance data.
#[derive(Debug, Clone)]
pub struct SymbolTree {
    root: Symbol,
    mathml: String,
    latex: String,
    document: Option<String>,
    num_pairs: usize,
}

impl SymbolTree {
    /// Finalize a parsed root: assign structural ids and cache the pair
    /// count. `num_pairs` is never recomputed after this.
    pub(crate) fn new(mut root: Symbol, mathml: String, latex: String) -> Self {
        root.assign_ids(SymbolPath::root());
        let num_pairs = crate::pairs::count(&root);
        SymbolTree {
            root,
            mathml,
            latex,
            document: None,
            num_pairs,
        }
    }

    pub fn root(&self) -> &Symbol {
        &self.root
    }

    /// The canonical MathML this tree was built from, kept for display.
    pub fn mathml(&self) -> &str {
        &self.mathml
    }

    /// The `alttext` LaTeX twin, if the markup carried one.
    pub fn latex(&self) -> &str {
        &self.latex
    }

    /// Provenance: the corpus entry this expression came from.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn set_document(&mut self, document: impl Into<String>) {
        self.document = Some(document.into());
    }

    /// Cached atom count; equals `extract(self).len()` by construction.
    pub fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    /// Iterate every symbol with its distance from the root.
    pub fn symbols(&self) -> SymbolIterator<'_> {
        SymbolIterator::new(&self.root)
    }

    /// Deterministic pre-order serialization used for exact-duplicate
    /// identity. Two markups that encode the same layout produce the same
    /// repr even when their source text differs.
    pub fn repr(&self) -> String {
        let mut out = String::from("SymbolTree");
        self.root.build_repr(&mut out);
        out
    }
}
