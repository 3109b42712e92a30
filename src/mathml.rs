//! Presentation-MathML and TeX parsing.
//!
//! The parser recognizes a closed set of presentation tags and maps each one
//! to a fixed tree-shape rule: `msup` hangs its script off the base's
//! `above`, `mfrac` becomes a synthetic `frac` symbol, `mfenced` expands to a
//! delimiter/separator baseline chain, and so on. Anything outside the set is
//! an [`Error::UnknownTag`] so corpus ingestion can tally missing tags
//! without aborting.
//!
//! Files are read with a streaming XML reader: only the element subtree of
//! the `<math>` currently being parsed is held in memory, so arbitrarily
//! large corpus documents stay bounded.
//!
//! TeX input is handled through the [`TexConverter`] delegate; the crate
//! never converts TeX itself.

use crate::error::{Error, Result};
use crate::tree::{Symbol, SymbolTree};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fmt::Write as _;
use std::io::{BufRead, Write as _};
use std::process::{Command, Stdio};

/// Recognized presentation-MathML tags (local names; the MathML namespace
/// prefix is stripped). Versioned with the parser: extending the set is a
/// behavior change for unknown-tag statistics.
pub const RECOGNIZED_TAGS: &[&str] = &[
    "math", "mn", "mo", "mi", "mtext", "mrow", "msub", "msup", "msubsup", "munder", "mover",
    "munderover", "msqrt", "mroot", "mfrac", "mfenced", "mpadded", "mstyle", "semantics", "none",
    "mspace",
];

/// U+2062 INVISIBLE TIMES; dropped from baseline rows.
const INVISIBLE_TIMES: &str = "\u{2062}";

/// A captured XML element subtree, the unit handed to the shape rules.
#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Canonical re-serialization; re-parsing the output yields an
    /// equivalent symbol tree.
    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", key, escape_xml(value));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape_xml(&self.text));
        for child in &self.children {
            child.render(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn render_string(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn local_name_of(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn element_from_start(e: &BytesStart<'_>) -> Result<Element> {
    let mut el = Element {
        name: local_name_of(e.local_name().as_ref()),
        ..Element::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Malformed(format!("bad attribute: {err}")))?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::Malformed(format!("bad attribute value: {err}")))?;
        el.attrs.push((
            local_name_of(attr.key.local_name().as_ref()),
            value.into_owned(),
        ));
    }
    Ok(el)
}

/// Stream every `<math>` element out of `input`, handing each expression's
/// parse result to `sink`. Returns `Err` only for file-level failures
/// (unreadable XML); per-expression failures go through the sink so callers
/// can tally them and keep going.
pub(crate) fn for_each_math<R: BufRead>(
    input: R,
    sink: &mut dyn FnMut(Result<SymbolTree>),
) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    // Element stack; non-empty exactly while inside a <math> subtree.
    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name_of(e.local_name().as_ref());
                if !stack.is_empty() || name == "math" {
                    stack.push(element_from_start(&e)?);
                }
            }
            Ok(Event::Empty(e)) => {
                if !stack.is_empty() {
                    let el = element_from_start(&e)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(el);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|err| Error::Malformed(format!("bad text: {err}")))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(el) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(el);
                    } else {
                        // A complete <math>; empty expressions are skipped.
                        match tree_from_math(&el) {
                            Ok(Some(tree)) => sink(Ok(tree)),
                            Ok(None) => {}
                            Err(err) => sink(Err(err)),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(Error::Malformed(format!(
                    "XML error at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
        }
        buf.clear();
    }
    if stack.is_empty() {
        Ok(())
    } else {
        Err(Error::Malformed("unclosed <math> element".into()))
    }
}

/// Parse every expression in a MathML/XHTML string, skipping expressions
/// that fail to parse.
pub fn parse_all(markup: &str) -> Result<Vec<SymbolTree>> {
    let mut trees = Vec::new();
    for_each_math(markup.as_bytes(), &mut |parsed| {
        if let Ok(tree) = parsed {
            trees.push(tree);
        }
    })?;
    Ok(trees)
}

/// Parse the first `<math>` element of a string. Queries come through here.
pub fn parse_mathml(markup: &str) -> Result<SymbolTree> {
    let mut first: Option<Result<SymbolTree>> = None;
    for_each_math(markup.as_bytes(), &mut |parsed| {
        if first.is_none() {
            first = Some(parsed);
        }
    })?;
    first.unwrap_or_else(|| Err(Error::Malformed("no <math> element found".into())))
}

/// Convert TeX through the delegate and parse the resulting MathML.
pub fn parse_tex(tex: &str, converter: &dyn TexConverter) -> Result<SymbolTree> {
    let mathml = converter.tex_to_mathml(tex)?;
    parse_mathml(&mathml).map_err(|err| match err {
        // Unknown tags stay distinguishable for ingestion statistics.
        Error::UnknownTag(tag) => Error::UnknownTag(tag),
        other => Error::Converter(format!("converter output did not parse: {other}")),
    })
}

fn tree_from_math(el: &Element) -> Result<Option<SymbolTree>> {
    let Some(root) = symbol_from_element(el)? else {
        return Ok(None);
    };
    let latex = el.attr("alttext").unwrap_or_default().to_string();
    Ok(Some(SymbolTree::new(root, el.render_string(), latex)))
}

/// Parse the children of a container, dropping empty results and invisible
/// operators.
fn row_children(el: &Element) -> Result<Vec<Symbol>> {
    let mut out = Vec::with_capacity(el.children.len());
    for child in &el.children {
        if let Some(sym) = symbol_from_element(child)? {
            if sym.tag() != INVISIBLE_TIMES {
                out.push(sym);
            }
        }
    }
    Ok(out)
}

/// Exactly `N` non-empty children, or a malformed-markup error.
fn fixed_children<const N: usize>(el: &Element) -> Result<[Symbol; N]> {
    let mut out = Vec::with_capacity(N);
    for child in &el.children {
        if let Some(sym) = symbol_from_element(child)? {
            out.push(sym);
        }
    }
    out.try_into().map_err(|got: Vec<Symbol>| {
        Error::Malformed(format!(
            "<{}> element with {} children, expected {N}",
            el.name,
            got.len(),
        ))
    })
}

/// Link `tail` onto the end of `head`'s baseline.
fn append_next(head: &mut Symbol, tail: Symbol) {
    let mut slot = &mut head.next;
    while let Some(node) = slot {
        slot = &mut node.next;
    }
    *slot = Some(Box::new(tail));
}

/// Chain symbols into one baseline row.
fn chain(symbols: Vec<Symbol>) -> Option<Symbol> {
    let mut iter = symbols.into_iter();
    let mut head = iter.next()?;
    for sym in iter {
        append_next(&mut head, sym);
    }
    Some(head)
}

/// Apply the shape rule for one element. `Ok(None)` means the element
/// contributes no symbols (`<none/>`, empty containers).
fn symbol_from_element(el: &Element) -> Result<Option<Symbol>> {
    match el.name.as_str() {
        "math" => match el.children.len() {
            0 => Ok(None),
            1 => symbol_from_element(&el.children[0]),
            n => Err(Error::Malformed(format!("<math> element with {n} children"))),
        },
        "semantics" | "mstyle" => match el.children.first() {
            Some(first) => symbol_from_element(first),
            None => Ok(None),
        },
        "mrow" | "mpadded" => Ok(chain(row_children(el)?)),
        "mn" | "mo" | "mi" | "mtext" => Ok(Some(Symbol::new(el.text.trim()))),
        "mspace" => Ok(Some(Symbol::new(" "))),
        "msub" => {
            let [mut base, script] = fixed_children(el)?;
            base.below = Some(Box::new(script));
            Ok(Some(base))
        }
        "msup" => {
            let [mut base, script] = fixed_children(el)?;
            base.above = Some(Box::new(script));
            Ok(Some(base))
        }
        // Both elements hang the first script above and the second below.
        // Indexing and querying share the convention, so matching only
        // needs it to be consistent.
        "msubsup" | "munderover" => {
            let [mut base, first, second] = fixed_children(el)?;
            base.above = Some(Box::new(first));
            base.below = Some(Box::new(second));
            Ok(Some(base))
        }
        "mover" => {
            let [mut base, script] = fixed_children(el)?;
            base.above = Some(Box::new(script));
            Ok(Some(base))
        }
        "munder" => {
            let [mut base, script] = fixed_children(el)?;
            base.below = Some(Box::new(script));
            Ok(Some(base))
        }
        // msqrt wraps an inferred row.
        "msqrt" => match chain(row_children(el)?) {
            Some(radicand) => {
                let mut root = Symbol::new("root2");
                root.within = Some(Box::new(radicand));
                Ok(Some(root))
            }
            None => Ok(None),
        },
        "mroot" => {
            let [radicand, index] = fixed_children(el)?;
            let mut root = Symbol::new(format!("root{}", index.tag()));
            root.within = Some(Box::new(radicand));
            Ok(Some(root))
        }
        "mfrac" => {
            let [numerator, denominator] = fixed_children(el)?;
            let mut frac = Symbol::new("frac");
            frac.above = Some(Box::new(numerator));
            frac.below = Some(Box::new(denominator));
            Ok(Some(frac))
        }
        "mfenced" => {
            let opening = Symbol::new(el.attr("open").unwrap_or("("));
            let closing = Symbol::new(el.attr("close").unwrap_or(")"));
            let separators: Vec<&str> = el
                .attr("separators")
                .unwrap_or(",")
                .split_whitespace()
                .collect();
            let kids = row_children(el)?;

            let mut row = vec![opening];
            for (i, kid) in kids.into_iter().enumerate() {
                if i > 0 && !separators.is_empty() {
                    let sep = separators[(i - 1).min(separators.len() - 1)];
                    row.push(Symbol::new(sep));
                }
                row.push(kid);
            }
            row.push(closing);
            Ok(chain(row))
        }
        "none" => Ok(None),
        other => Err(Error::UnknownTag(other.to_string())),
    }
}

/// The TeX -> presentation-MathML boundary. The engine only requires this
/// single call from its environment; any converter can be plugged in.
pub trait TexConverter {
    fn tex_to_mathml(&self, tex: &str) -> Result<String>;
}

/// A [`TexConverter`] that pipes TeX through an external command's stdin and
/// reads MathML from its stdout.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandConverter {
            program: program.into(),
            args,
        }
    }

    /// The stock LaTeXML command line.
    pub fn latexml() -> Self {
        CommandConverter::new(
            "latexmlmath",
            vec!["-pmml".into(), "-".into(), "-".into()],
        )
    }

    /// Parse a whitespace-separated command line, e.g. `"latexmlmath -pmml - -"`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(CommandConverter::new(
            program,
            parts.map(str::to_string).collect(),
        ))
    }
}

impl TexConverter for CommandConverter {
    fn tex_to_mathml(&self, tex: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| Error::Converter(format!("spawn {}: {err}", self.program)))?;
        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            stdin
                .write_all(tex.as_bytes())
                .map_err(|err| Error::Converter(format!("write to {}: {err}", self.program)))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| Error::Converter(format!("wait for {}: {err}", self.program)))?;
        if !output.status.success() {
            return Err(Error::Converter(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_escapes_elements() {
        let el = Element {
            name: "mo".into(),
            attrs: vec![("form".into(), "a<b".into())],
            children: vec![],
            text: "&".into(),
        };
        assert_eq!(el.render_string(), "<mo form=\"a&lt;b\">&amp;</mo>");
    }

    #[test]
    fn unknown_tag_is_distinguishable() {
        let err = parse_mathml("<math><merror><mi>x</mi></merror></math>").unwrap_err();
        match err {
            Error::UnknownTag(tag) => assert_eq!(tag, "merror"),
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn empty_math_is_skipped() {
        assert!(parse_all("<p><math></math></p>").expect("parse").is_empty());
        assert!(parse_mathml("<math></math>").is_err());
    }
}
