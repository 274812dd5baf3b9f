use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use searchcore::graph::LinkGraph;
use searchcore::hits::{write_scores, HitsRanker};
use searchcore::{EngineConfig, IndexBuilder, QueryType, RankingType, Searcher};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, rank and query a persistent inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every file under a directory
    Build {
        /// Corpus directory (or a single file)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Engine configuration JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of dictionary slots
        #[arg(long)]
        table_size: Option<u64>,
        /// File of regexes for tokens kept whole
        #[arg(long)]
        patterns: Option<PathBuf>,
    },
    /// Run HITS over a whole link graph and write the top hubs and authorities
    Hits {
        #[arg(long)]
        links: PathBuf,
        #[arg(long)]
        titles: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 30)]
        top: usize,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Query an existing index
    Query {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        q: String,
        #[arg(long = "type", default_value = "ranked")]
        query_type: QueryType,
        #[arg(long, default_value = "tf-idf")]
        ranking: RankingType,
        /// Number of results to print
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, config, table_size, patterns } => {
            let mut cfg = load_config(config.as_deref())?;
            cfg.index_dir = output;
            if let Some(n) = table_size {
                cfg.table_size = n;
            }
            if patterns.is_some() {
                cfg.tokenizer.patterns_file = patterns;
            }
            cfg.validate()?;
            build_index(&input, &cfg)
        }
        Commands::Hits { links, titles, out_dir, top, config } => {
            let cfg = load_config(config.as_deref())?;
            rank_graph(&links, &titles, &out_dir, top, &cfg)
        }
        Commands::Query { index, q, query_type, ranking, k, config } => {
            let mut cfg = load_config(config.as_deref())?;
            cfg.index_dir = index;
            run_query(cfg, &q, query_type, ranking, k)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Files under `input` in path order, so docIDs are stable between runs.
fn corpus_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

fn build_index(input: &Path, cfg: &EngineConfig) -> Result<()> {
    let started = Instant::now();
    let files = corpus_files(input);
    tracing::info!(input = %input.display(), files = files.len(), "indexing corpus");

    let mut builder = IndexBuilder::persistent(cfg)?;
    for file in &files {
        builder.add_file(file).with_context(|| format!("reading {}", file.display()))?;
    }
    let (_, _, stats) = builder.finish_persistent()?;

    tracing::info!(
        output = %cfg.index_dir.display(),
        docs = stats.num_docs,
        tokens = stats.num_tokens,
        elapsed_s = started.elapsed().as_secs_f64(),
        "index build complete"
    );
    Ok(())
}

fn rank_graph(links: &Path, titles: &Path, out_dir: &Path, top: usize, cfg: &EngineConfig) -> Result<()> {
    let graph = LinkGraph::load(links, titles);
    let scores = HitsRanker::new(cfg.hits_max_iterations).rank_all(&graph);
    tracing::info!(iterations = scores.iterations, converged = scores.converged, "HITS finished");

    fs::create_dir_all(out_dir)?;
    let hubs = out_dir.join(format!("hubs_top_{top}.txt"));
    let authorities = out_dir.join(format!("authorities_top_{top}.txt"));
    write_scores(&scores.top_hubs(top), &hubs)?;
    write_scores(&scores.top_authorities(top), &authorities)?;
    tracing::info!(hubs = %hubs.display(), authorities = %authorities.display(), "scores written");
    Ok(())
}

fn run_query(cfg: EngineConfig, text: &str, query_type: QueryType, ranking: RankingType, k: usize) -> Result<()> {
    let searcher = Searcher::open(cfg).context("opening index")?;
    let query = searcher.parse_query(text);
    let started = Instant::now();
    let outcome = searcher.search(&query, query_type, ranking)?;
    let took = started.elapsed().as_secs_f64();

    if !outcome.unknown_terms.is_empty() {
        println!("No matches; unknown terms: {}", outcome.unknown_terms.join(", "));
        for s in &outcome.suggestions {
            println!("  did you mean: {s}");
        }
        return Ok(());
    }

    println!("Found {} matching document(s) in {:.3} seconds", outcome.results.len(), took);
    for (rank, entry) in outcome.results.iter().take(k).enumerate() {
        let name = searcher.docs().get(entry.doc_id).map(|d| d.name()).unwrap_or("?");
        match query_type {
            QueryType::Ranked => println!("{:>3}. {} {:.5}", rank + 1, name, entry.score),
            _ => println!("{:>3}. {}", rank + 1, name),
        }
    }
    Ok(())
}
