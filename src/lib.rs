//! Structural search over mathematical expressions.
//!
//! Expressions are parsed from presentation MathML (or TeX via an external
//! converter) into symbol layout trees, decomposed into symbol-pair atoms,
//! and served from inverted indices under one of seven ranking strategies.
//!
//! ```no_run
//! use mathfind::index::{Index, PairIndex};
//! use mathfind::mathml::parse_mathml;
//! use mathfind::rank;
//!
//! # fn main() -> mathfind::Result<()> {
//! let mut index = PairIndex::new(rank::by_name("fmeasure").unwrap());
//! index.add(parse_mathml("<math><msup><mi>x</mi><mn>2</mn></msup></math>")?)?;
//! let outcome = index.search_mathml("<math><msup><mi>x</mi><mn>2</mn></msup></math>")?;
//! assert_eq!(outcome.hits[0].expr_id, 0);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod corpus;
pub mod error;
pub mod index;
pub mod mathml;
pub mod pairs;
pub mod provenance;
pub mod rank;
pub mod store;
pub mod tracing;
pub mod tree;

pub use error::{Error, Result};
