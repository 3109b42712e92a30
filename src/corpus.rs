//! Batch corpus ingestion.
//!
//! Walks a directory tree, parses every recognized file, and folds
//! per-expression failures into an [`IngestStats`] counter instead of
//! aborting the run. A corpus walk always completes and reports what it
//! could not parse; only storage failures propagate.

use crate::error::{Error, Result};
use crate::mathml::{self, TexConverter, parse_tex};
use crate::tree::SymbolTree;
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// File extensions treated as MathML corpus documents (zero or more `<math>`
/// elements per file).
pub const MATHML_EXTENSIONS: &[&str] = &["xhtml", "mathml", "mml"];

/// Aggregate results of a corpus walk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// Recognized files scanned.
    pub documents: u64,
    /// Expressions successfully parsed and handed to the index.
    pub expressions: u64,
    /// Histogram of unrecognized MathML tags, for coverage planning.
    pub unknown_tags: BTreeMap<String, u64>,
    /// Expressions or files with structurally invalid markup.
    pub malformed: u64,
    /// TeX expressions the external converter could not handle.
    pub converter_failures: u64,
}

impl IngestStats {
    /// Fold another walk's tallies into this one.
    pub fn merge(&mut self, other: &IngestStats) {
        self.documents += other.documents;
        self.expressions += other.expressions;
        for (tag, count) in &other.unknown_tags {
            *self.unknown_tags.entry(tag.clone()).or_insert(0) += count;
        }
        self.malformed += other.malformed;
        self.converter_failures += other.converter_failures;
    }

    fn record(&mut self, err: &Error) {
        match err {
            Error::UnknownTag(tag) => {
                *self.unknown_tags.entry(tag.clone()).or_insert(0) += 1;
            }
            Error::Malformed(_) => self.malformed += 1,
            Error::Converter(_) => self.converter_failures += 1,
            // Storage and I/O failures are handled by the caller.
            _ => {}
        }
    }
}

/// Recursively walk `dir`, parsing every recognized file and feeding each
/// expression to `sink`. Parse failures are tallied in `stats`; a sink error
/// (storage loss) aborts the walk.
pub fn walk(
    dir: &Path,
    converter: Option<&dyn TexConverter>,
    stats: &mut IngestStats,
    sink: &mut dyn FnMut(SymbolTree) -> Result<()>,
) -> Result<()> {
    for entry in WalkBuilder::new(dir).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        parse_file(entry.path(), converter, stats, sink)?;
    }
    Ok(())
}

/// Parse one corpus file. `.tex` files hold a single expression routed
/// through the TeX delegate; MathML files are streamed for `<math>`
/// elements. Unrecognized extensions are skipped.
pub fn parse_file(
    path: &Path,
    converter: Option<&dyn TexConverter>,
    stats: &mut IngestStats,
    sink: &mut dyn FnMut(SymbolTree) -> Result<()>,
) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if ext == "tex" {
        stats.documents += 1;
        let Some(converter) = converter else {
            tracing::debug!(path = %path.display(), "no TeX converter configured, skipping");
            return Ok(());
        };
        let tex = match std::fs::read_to_string(path) {
            Ok(tex) => tex,
            Err(err) => {
                tracing::warn!(path = %path.display(), "unreadable file: {err}");
                stats.malformed += 1;
                return Ok(());
            }
        };
        match parse_tex(&tex, converter) {
            Ok(mut tree) => {
                tree.set_document(path.display().to_string());
                stats.expressions += 1;
                sink(tree)?;
            }
            Err(err) if err.is_recoverable() => {
                tracing::debug!(path = %path.display(), "skipping expression: {err}");
                stats.record(&err);
            }
            Err(err) => return Err(err),
        }
        return Ok(());
    }

    if !MATHML_EXTENSIONS.contains(&ext.as_str()) {
        tracing::debug!(path = %path.display(), "unknown filetype, skipping");
        return Ok(());
    }

    stats.documents += 1;
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = %path.display(), "unreadable file: {err}");
            stats.malformed += 1;
            return Ok(());
        }
    };

    let mut fatal: Option<Error> = None;
    let streamed = mathml::for_each_math(BufReader::new(file), &mut |parsed| {
        if fatal.is_some() {
            return;
        }
        match parsed {
            Ok(mut tree) => {
                tree.set_document(path.display().to_string());
                stats.expressions += 1;
                if let Err(err) = sink(tree) {
                    fatal = Some(err);
                }
            }
            Err(err) => stats.record(&err),
        }
    });
    if let Some(err) = fatal {
        return Err(err);
    }
    if let Err(err) = streamed {
        tracing::warn!(path = %path.display(), "skipping file: {err}");
        stats.malformed += 1;
    }
    Ok(())
}

/// Convenience wrapper collecting every parsed tree in memory.
pub fn parse_directory(
    dir: &Path,
    converter: Option<&dyn TexConverter>,
) -> Result<(Vec<SymbolTree>, IngestStats)> {
    let mut stats = IngestStats::default();
    let mut trees = Vec::new();
    walk(dir, converter, &mut stats, &mut |tree| {
        trees.push(tree);
        Ok(())
    })?;
    Ok((trees, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_walk_recovers_from_unknown_tags() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("page.mml"),
            "<html><body>\
             <math><mrow><mi>a</mi><mo>+</mo><mi>b</mi></mrow></math>\
             <math><mglyph/></math>\
             <math><msup><mi>x</mi><mn>2</mn></msup></math>\
             </body></html>",
        )
        .expect("write corpus file");
        std::fs::write(dir.path().join("notes.txt"), "not markup").expect("write");

        let (trees, stats) = parse_directory(dir.path(), None).expect("walk");
        assert_eq!(trees.len(), 2);
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.expressions, 2);
        assert_eq!(stats.unknown_tags.get("mglyph"), Some(&1));
        assert!(trees[0].document().is_some());
    }
}
