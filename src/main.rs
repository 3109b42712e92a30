use anyhow::{Context, bail};
use clap::Parser;
use mathfind::cli::{Cli, Commands};
use mathfind::corpus::IngestStats;
use mathfind::index::{Index, PostingIndex};
use mathfind::mathml::{CommandConverter, TexConverter};
use mathfind::rank;
use mathfind::store::MemoryStore;

fn converter_from(command: Option<&str>) -> anyhow::Result<CommandConverter> {
    match command {
        Some(line) => CommandConverter::from_command_line(line)
            .with_context(|| format!("empty converter command {line:?}")),
        None => Ok(CommandConverter::latexml()),
    }
}

fn main() -> anyhow::Result<()> {
    mathfind::tracing::init();
    let cli = Cli::parse();

    let ranker = rank::by_name(&cli.ranker).with_context(|| {
        format!(
            "unknown ranker {:?}, expected one of: {}",
            cli.ranker,
            rank::RANKER_NAMES.join(", ")
        )
    })?;
    let store = if cli.store.exists() {
        MemoryStore::load(&cli.store)
            .with_context(|| format!("failed to load snapshot {}", cli.store.display()))?
    } else {
        MemoryStore::new()
    };
    let mut index = PostingIndex::new(store, ranker);

    match cli.command {
        Commands::Index {
            directories,
            tex_command,
        } => {
            if directories.is_empty() {
                bail!("no corpus directories given");
            }
            let converter = tex_command
                .as_deref()
                .map(|line| converter_from(Some(line)))
                .transpose()?;
            let mut totals = IngestStats::default();
            for dir in &directories {
                let stats = index
                    .add_directory(dir, converter.as_ref().map(|c| c as &dyn TexConverter))
                    .with_context(|| format!("ingesting {}", dir.display()))?;
                totals.merge(&stats);
            }
            index.second_pass()?;
            index.into_store().save(&cli.store)?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
        Commands::Search {
            query,
            tex,
            tex_command,
        } => {
            let outcome = if tex {
                let converter = converter_from(tex_command.as_deref())?;
                index.search_tex(&query, &converter)?
            } else {
                index.search_mathml(&query)?
            };
            tracing::info!(
                candidates = outcome.candidates,
                hits = outcome.hits.len(),
                "search complete"
            );
            println!("{}", serde_json::to_string_pretty(&outcome.hits)?);
        }
        Commands::SecondPass => {
            index.second_pass()?;
            index.into_store().save(&cli.store)?;
        }
        Commands::Stats { large } => {
            let stats = index.stats()?;
            let posting_sizes = index.list_sizes(large)?;
            let report = serde_json::json!({
                "stats": stats,
                "posting_sizes": posting_sizes,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Random => match index.random()? {
            Some(summary) => {
                println!("expression {}", summary.expr_id);
                if !summary.latex.is_empty() {
                    println!("latex:  {}", summary.latex);
                }
                println!("mathml: {}", summary.mathml);
            }
            None => println!("index is empty"),
        },
        Commands::Flush => {
            index.flush()?;
            index.into_store().save(&cli.store)?;
        }
    }
    Ok(())
}
