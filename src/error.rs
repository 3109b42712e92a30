//! Error handling types and utilities.

/// A specialized Result type for mathfind operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing markup, ranking, or talking to storage.
///
/// Per-expression failures (`UnknownTag`, `Malformed`, `Converter`) are
/// recovered at the corpus walk and folded into [`crate::corpus::IngestStats`];
/// only `Storage` is fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A MathML element outside the recognized tag set. Carries the offending
    /// tag so ingestion can tally it without aborting the run.
    #[error("unknown MathML tag <{0}>")]
    UnknownTag(String),

    /// Markup that is recognized but structurally invalid (wrong arity,
    /// truncated XML, empty expression).
    #[error("malformed markup: {0}")]
    Malformed(String),

    /// The external TeX -> MathML delegate failed or produced output the
    /// MathML parser rejected.
    #[error("TeX conversion failed: {0}")]
    Converter(String),

    /// The storage adapter is unreachable or inconsistent. Nothing further
    /// can be indexed or searched, so this propagates.
    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that corpus ingestion recovers from locally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Storage(_) | Error::Io(_))
    }
}
