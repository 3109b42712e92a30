use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mathfind")]
#[command(about = "Structural search over mathematical expressions", long_about = None)]
pub struct Cli {
    /// Index snapshot file, created on first use.
    #[arg(short, long, default_value = "mathfind.db")]
    pub store: PathBuf,

    /// Ranking strategy: fmeasure, distance, recall, prefix, tfidf,
    /// tfidf-prefix, or everything.
    #[arg(short, long, default_value = "fmeasure")]
    pub ranker: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest corpus directories, then run the second pass.
    Index {
        directories: Vec<PathBuf>,
        /// TeX-to-MathML converter command for .tex files,
        /// e.g. "latexmlmath -pmml - -".
        #[arg(long)]
        tex_command: Option<String>,
    },
    /// Query with inline MathML (or TeX with --tex); prints hits as JSON.
    Search {
        query: String,
        /// Treat the query as TeX and convert it first.
        #[arg(long)]
        tex: bool,
        /// Converter command used with --tex; defaults to latexmlmath.
        #[arg(long)]
        tex_command: Option<String>,
    },
    /// Rewrite frequency-dependent normalizers from current posting lists.
    SecondPass,
    /// Print corpus counters and the posting-size distribution.
    Stats {
        /// Only report posting lists longer than twice the average.
        #[arg(long)]
        large: bool,
    },
    /// Print one uniformly drawn indexed expression.
    Random,
    /// Delete the whole index.
    Flush,
}
