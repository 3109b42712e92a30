//! Provenance links for search results.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static MML_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^/]*)\.mml$").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// A clickable source reference attached to a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub title: String,
}

/// Build the outbound link for a corpus document. Documents harvested from
/// Wikipedia article dumps are named `<article>.mml`, so those become an
/// article search; anything else links to itself.
pub fn document_link(document: &str) -> Link {
    match MML_NAME.captures(document).and_then(|c| c.get(1)) {
        Some(name) => {
            let title = name.as_str().replace('_', " ");
            let encoded: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
            Link {
                url: format!("https://en.wikipedia.org/wiki/Special:Search?search={encoded}"),
                title,
            }
        }
        None => Link {
            url: document.to_string(),
            title: document.to_string(),
        },
    }
}
