//! # docqa CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Start the HTTP server (`/upload`, `/ask`, `/health`) |
//! | `docqa ingest <paths>…` | Index PDFs (files or directories), replacing the current index |
//! | `docqa ask "<question>"` | Answer a question from the current index |
//!
//! ## Examples
//!
//! ```bash
//! docqa --config ./config/docqa.toml serve
//! docqa ingest handbook.pdf ./policies/
//! docqa ask "How many vacation days do new hires get?" --show-context
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use docqa::config;
use docqa::extract::SUPPORTED_EXTENSIONS;
use docqa::models::UploadedFile;
use docqa::server;
use docqa::service::QaService;

/// docqa — ask questions about your PDF documents.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — ask questions about your PDF documents",
    version,
    long_about = "docqa extracts and indexes the text of uploaded PDFs and answers natural-language \
    questions using only the indexed content, via an HTTP API or this CLI."
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `POST /upload`, `POST /ask` and
    /// `GET /health`.
    Serve,

    /// Index documents, replacing the current index.
    ///
    /// Directories are searched recursively for `.pdf`, `.txt`, `.md` and
    /// `.markdown` files.
    /// Files are indexed in the order given (directory contents sorted by path).
    Ingest {
        /// Files or directories to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Answer a question from the current index.
    Ask {
        question: String,

        /// Also print the retrieved context.
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { paths } => {
            let service = QaService::from_config(cfg)?;
            let files = collect_files(&paths)?;
            let uploads = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let report = service.ingest(uploads).await?;
            println!(
                "{}: {} files, {} chunks",
                report.status,
                files.len(),
                report.num_chunks
            );
        }
        Commands::Ask {
            question,
            show_context,
        } => {
            let service = QaService::from_config(cfg)?;
            let response = service.ask(&question).await?;
            println!("{}", response.answer);
            if show_context {
                println!("\n--- context ---\n{}", response.context);
            }
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docqa=info,tower_http=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Expand directories into their ingestible files, keeping argument order.
fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| is_ingestible(p))
                .collect();
            found.sort();
            if found.is_empty() {
                tracing::warn!("no ingestible files under {}", path.display());
            }
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn is_ingestible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn read_upload(path: &Path) -> anyhow::Result<UploadedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(file_name, bytes))
}
