//! Shared fixtures for integration tests.
//!
//! Each test gets a fresh temporary corpus directory; nothing is shared
//! between tests, so ingestion and search always start from a cold index.

use mathfind::mathml::parse_mathml;
use mathfind::tree::SymbolTree;
use rstest::fixture;
use std::path::Path;
use tempfile::TempDir;

/// A temporary corpus directory of `.mml` documents, cleaned up on drop.
pub struct CorpusDir {
    temp: TempDir,
}

#[allow(dead_code)] // Helpers used across different integration test crates
impl CorpusDir {
    pub fn new() -> Self {
        CorpusDir {
            temp: tempfile::tempdir().expect("create corpus tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Write one document holding the given `<math>` elements.
    pub fn write_doc(&self, name: &str, maths: &[&str]) {
        let mut body = String::from("<html><body>");
        for math in maths {
            body.push_str(math);
        }
        body.push_str("</body></html>");
        std::fs::write(self.temp.path().join(name), body).expect("write corpus doc");
    }
}

pub fn tree(markup: &str) -> SymbolTree {
    parse_mathml(markup).expect("fixture markup parses")
}

/// Markup for `a^n + b^n = c^n`.
#[allow(dead_code)]
pub fn power_sum(a: &str, b: &str, c: &str, n: &str) -> String {
    let sup = |base: &str| format!("<msup><mi>{base}</mi><mn>{n}</mn></msup>");
    format!(
        "<math alttext=\"{a}^{n}+{b}^{n}={c}^{n}\"><mrow>{}<mo>+</mo>{}<mo>=</mo>{}</mrow></math>",
        sup(a),
        sup(b),
        sup(c)
    )
}

/// Three expressions sharing the `+`/`=` skeleton: the Pythagorean identity,
/// its cubic sibling, and a renamed copy.
#[fixture]
#[allow(dead_code)]
pub fn pythagorean_corpus() -> CorpusDir {
    let corpus = CorpusDir::new();
    corpus.write_doc(
        "Pythagorean_theorem.mml",
        &[&power_sum("a", "b", "c", "2")],
    );
    corpus.write_doc(
        "Fermat_cubes.mml",
        &[&power_sum("a", "b", "c", "3"), &power_sum("x", "y", "z", "2")],
    );
    corpus
}
