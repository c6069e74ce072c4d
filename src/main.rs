//! # csv-rag CLI (`csvrag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csvrag ingest <file.csv>` | Embed a CSV and replace the persisted index |
//! | `csvrag ask "<question>"` | Answer a question from the persisted index |
//! | `csvrag info` | Show metadata of the persisted index |
//! | `csvrag serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! csvrag --config ./config/csvrag.toml ingest ./data/customers.csv
//! RETRIEVAL_MODE=similarity csvrag ask "Which region has the highest ARR?"
//! LLM_PROVIDER=openai csvrag serve
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use csv_rag::config;
use csv_rag::index::VectorIndex;
use csv_rag::logging;
use csv_rag::pipeline::Rag;
use csv_rag::server;

/// csv-rag: ask cited questions over a CSV.
///
/// Settings are read from the `--config` TOML file (optional) and then
/// overridden by environment variables such as `INDEX_DIR`,
/// `OLLAMA_BASE_URL`, `RETRIEVAL_MODE`, and `LLM_PROVIDER`.
#[derive(Parser)]
#[command(name = "csvrag", version, about = "Ask cited questions over a CSV")]
struct Cli {
    /// Path to configuration file (TOML). Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "./config/csvrag.toml")]
    config: PathBuf,

    /// Log pipeline events to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a CSV file and make it the current index.
    ///
    /// Every non-empty row becomes one document. The previous index is
    /// replaced only once the new one is fully embedded and written.
    Ingest {
        /// Path to the `.csv` file.
        path: PathBuf,
    },

    /// Answer a question using the persisted index.
    Ask {
        /// The question text.
        question: String,
    },

    /// Show metadata of the persisted index.
    Info,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` (or `BIND_ADDR`) and restores the persisted
    /// index, if any.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose || matches!(cli.command, Commands::Serve));

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Info => match VectorIndex::read_metadata(&cfg.index.dir)? {
            Some(meta) => {
                println!("index: {}", cfg.index.dir.display());
                println!("  index id:   {}", meta.index_id);
                println!("  source:     {}", meta.source_name);
                println!("  rows:       {}", meta.row_count);
                println!(
                    "  embedding:  {}/{} ({} dims)",
                    meta.embedding_provider, meta.embedding_model, meta.dims
                );
                let created = chrono::DateTime::from_timestamp(meta.created_utc, 0)
                    .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_else(|| meta.created_utc.to_string());
                println!("  created:    {}", created);
            }
            None => println!("No index found at {}", cfg.index.dir.display()),
        },
        Commands::Ingest { path } => {
            let is_csv = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !is_csv {
                bail!("Upload a CSV: {} does not have a .csv extension", path.display());
            }
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());

            let rag = Rag::from_config(cfg)?;
            let report = rag.ingest_csv(&bytes, &source).await?;
            println!("ingest {}", source);
            println!("  rows indexed: {}", report.rows);
            println!("  index id:     {}", report.index_id);
        }
        Commands::Ask { question } => {
            let rag = Rag::from_config(cfg)?;
            rag.restore().await;
            let response = rag.ask(&question).await?;
            println!("{}", response.answer);
            let sources: Vec<String> = response.sources.iter().map(|r| r.to_string()).collect();
            println!();
            println!("sources: {}", sources.join(", "));
            if response.degraded {
                std::process::exit(2);
            }
        }
        Commands::Serve => {
            let rag = Arc::new(Rag::from_config(cfg)?);
            server::run_server(rag).await?;
        }
    }

    Ok(())
}
