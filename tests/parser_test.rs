mod common;

use assert2::check;
use common::tree;
use mathfind::error::Error;
use mathfind::mathml::{parse_all, parse_mathml};
use rstest::rstest;

#[test]
fn mfenced_default_separators_chain_five_symbols() {
    let parsed = tree("<math><mfenced><mi>a</mi><mi>b</mi></mfenced></math>");
    let tags: Vec<String> = parsed
        .symbols()
        .map(|(sym, _, _)| sym.tag().to_string())
        .collect();
    check!(tags == vec!["(", "a", ",", "b", ")"]);
    // One row: every symbol hangs off the previous through `next`.
    let ids: Vec<String> = parsed
        .symbols()
        .map(|(sym, _, _)| sym.id().to_string())
        .collect();
    check!(ids == vec!["0", "00", "000", "0000", "00000"]);
}

#[test]
fn mfenced_explicit_fences_and_separators() {
    let parsed = tree(
        "<math><mfenced open=\"[\" close=\"]\" separators=\"; ,\">\
         <mi>a</mi><mi>b</mi><mi>c</mi></mfenced></math>",
    );
    let tags: Vec<String> = parsed
        .symbols()
        .map(|(sym, _, _)| sym.tag().to_string())
        .collect();
    check!(tags == vec!["[", "a", ";", "b", ",", "c", "]"]);
}

#[rstest]
#[case("<math><msup><mi>x</mi><mn>2</mn></msup></math>", "x", "2")]
#[case("<math><mover><mi>v</mi><mo>&#8594;</mo></mover></math>", "v", "\u{2192}")]
fn scripts_attach_above(#[case] markup: &str, #[case] base: &str, #[case] script: &str) {
    let parsed = tree(markup);
    let root = parsed.root();
    check!(root.tag() == base);
    let above = root
        .child(mathfind::tree::Relation::Above)
        .expect("script above the base");
    check!(above.tag() == script);
}

#[test]
fn sqrt_wraps_radicand_within() {
    let parsed = tree("<math><msqrt><mi>x</mi><mo>+</mo><mn>1</mn></msqrt></math>");
    let root = parsed.root();
    check!(root.tag() == "root2");
    let within = root
        .child(mathfind::tree::Relation::Within)
        .expect("radicand");
    check!(within.tag() == "x");
}

#[test]
fn mroot_tag_carries_the_index() {
    let parsed = tree("<math><mroot><mi>x</mi><mn>3</mn></mroot></math>");
    check!(parsed.root().tag() == "root3");
}

#[test]
fn alttext_is_kept_as_latex_twin() {
    let parsed = tree("<math alttext=\"x^2\"><msup><mi>x</mi><mn>2</mn></msup></math>");
    check!(parsed.latex() == "x^2");
}

#[test]
fn rendered_mathml_reparses_to_the_same_layout() {
    let markups = [
        "<math><mrow><mi>a</mi><mo>+</mo><mfrac><mi>b</mi><mn>2</mn></mfrac></mrow></math>",
        "<math><msubsup><mi>x</mi><mi>i</mi><mn>2</mn></msubsup></math>",
        "<math><mfenced><mi>a</mi><mi>b</mi></mfenced></math>",
    ];
    for markup in markups {
        let first = tree(markup);
        let second = parse_mathml(first.mathml()).expect("re-parse rendered markup");
        check!(first.repr() == second.repr(), "round trip failed for {markup}");
        check!(first.num_pairs() == second.num_pairs());
    }
}

#[test]
fn unknown_tags_surface_by_name() {
    let err = parse_mathml("<math><mglyph/></math>").unwrap_err();
    match err {
        Error::UnknownTag(tag) => {
            check!(tag == "mglyph");
        }
        other => panic!("expected UnknownTag, got {other:?}"),
    }
}

#[test]
fn parse_all_skips_bad_expressions() {
    let trees = parse_all(
        "<html><body>\
         <math><mi>a</mi></math>\
         <math><mglyph/></math>\
         <math><mn>7</mn></math>\
         </body></html>",
    )
    .expect("stream parses");
    let tags: Vec<String> = trees.iter().map(|t| t.root().tag().to_string()).collect();
    check!(tags == vec!["a", "7"]);
}

#[test]
fn documents_without_math_are_an_error_for_single_parse() {
    let err = parse_mathml("<html><body><p>prose</p></body></html>").unwrap_err();
    check!(matches!(err, Error::Malformed(_)));
}
