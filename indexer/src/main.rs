use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pubsearch_core::persist::{load_index, save_index, IndexPaths};
use pubsearch_core::stats::{CollectionStats, Evaluation};
use pubsearch_core::{DocId, InvertedIndex, Record};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query a TF-IDF index over publication records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
    },
    /// Run a ranked query against a saved index
    Search {
        #[arg(long, default_value = "./index")]
        index: String,
        /// Query text
        #[arg(long)]
        query: String,
        /// Maximum hits to print
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Print collection statistics, and evaluation metrics when a query is given
    Stats {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        query: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_index(&input, &output),
        Commands::Search { index, query, k } => search_index(&index, &query, k),
        Commands::Stats { index, query } => print_stats(&index, query.as_deref()),
    }
}

fn build_index(input: &str, output: &str) -> Result<()> {
    let input_path = Path::new(input);
    let out_paths = IndexPaths::new(output);

    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("input {input} does not exist");
    }

    let mut index = InvertedIndex::new();
    let mut next_doc_id: DocId = 0;
    for file in files {
        let records = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)?
        } else {
            read_json(&file)?
        };
        tracing::info!(file = %file.display(), records = records.len(), "read records");
        for record in records {
            index.ingest_unique(next_doc_id, record)?;
            next_doc_id += 1;
        }
    }

    tracing::info!(num_docs = index.num_docs(), num_terms = index.vocabulary_size(), "ingested documents");
    index.rebuild();
    save_index(&out_paths, &index)?;

    tracing::info!(output, "index build complete");
    Ok(())
}

fn read_jsonl(file: &Path) -> Result<Vec<Record>> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn read_json(file: &Path) -> Result<Vec<Record>> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    Ok(match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => {
            tracing::warn!(file = %file.display(), "skipping file without records");
            Vec::new()
        }
    })
}

fn search_index(index_dir: &str, query: &str, k: usize) -> Result<()> {
    let index = load_index(&IndexPaths::new(index_dir))?;
    let hits = index.search(query);
    println!("{} hits for {:?}", hits.len(), query);
    for hit in hits.iter().take(k) {
        let title = hit.record.get("title").and_then(|t| t.as_str()).unwrap_or("");
        println!("{:>6}  cosine={:.4}  tfidf={:.4}  {}", hit.doc_id, hit.cosine, hit.tfidf_score, title);
    }
    Ok(())
}

fn print_stats(index_dir: &str, query: Option<&str>) -> Result<()> {
    let index = load_index(&IndexPaths::new(index_dir))?;
    let stats = CollectionStats::compute(&index);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if let Some(q) = query {
        let hits = index.search(q);
        let eval = Evaluation::compute(&index, q, &hits);
        println!("{}", serde_json::to_string_pretty(&eval)?);
    }
    Ok(())
}
