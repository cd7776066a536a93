//! The ingest and ask workflows.
//!
//! [`QaService`] owns the configuration, the embedding and chat backends, and
//! the single on-disk index slot. The HTTP server and the CLI both drive it.
//!
//! ```text
//! ingest: upload → temp file → extract → chunk ─┐ (per file, in order)
//!                                               └→ build index → persist (replace)
//! ask:    load index → retrieve top-k → prompt LLM → {answer, context}
//! ```
//!
//! Persisting takes the write side of an `RwLock` and loading takes the read
//! side, so an ask never reads a half-swapped index. Two concurrent ingests
//! still race; the last one to persist wins.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::chunk::chunk_pages;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::extract::{extract_pages, ExtractError};
use crate::generate::{answer, create_chat_model, ChatModel};
use crate::index::VectorIndex;
use crate::models::{AskResponse, IngestReport, Page, UploadedFile};
use crate::retrieve::retrieve;

/// Status string reported by a successful ingest.
pub const INGEST_STATUS: &str = "PDF processed";

pub struct QaService {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    index_lock: RwLock<()>,
}

impl QaService {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> Self {
        Self {
            config: Arc::new(config),
            embedder,
            chat,
            index_lock: RwLock::new(()),
        }
    }

    /// Build the service with the backends named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.llm)?;
        Ok(Self::new(config, embedder, chat))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract, chunk and index `files`, replacing the current index.
    ///
    /// Files are processed in order and their segments concatenated. Any
    /// failure aborts the whole ingest and leaves the previous index intact.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestReport> {
        if files.is_empty() {
            return Err(Error::Validation("no files uploaded".to_string()));
        }

        let file_count = files.len();
        let mut segments = Vec::new();
        for file in files {
            let name = file.file_name.clone();
            let pages = self.extract_upload(file).await?;
            let chunks = chunk_pages(&pages, &self.config.chunking);
            tracing::debug!(
                file = %name,
                pages = pages.len(),
                chunks = chunks.len(),
                "extracted document"
            );
            segments.extend(chunks);
        }

        let num_chunks = segments.len();
        let index = VectorIndex::build(self.embedder.as_ref(), segments).await?;

        {
            let _guard = self.index_lock.write().await;
            let path = self.config.index.path.clone();
            tokio::task::spawn_blocking(move || index.persist(&path))
                .await
                .map_err(join_error)??;
        }

        tracing::info!(files = file_count, num_chunks, "ingested documents");
        Ok(IngestReport {
            status: INGEST_STATUS.to_string(),
            num_chunks,
        })
    }

    /// Answer `question` from the current index.
    pub async fn ask(&self, question: &str) -> Result<AskResponse> {
        if question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }

        let index = {
            let _guard = self.index_lock.read().await;
            let path = self.config.index.path.clone();
            let embedder = Arc::clone(&self.embedder);
            tokio::task::spawn_blocking(move || VectorIndex::load(&path, embedder.as_ref()))
                .await
                .map_err(join_error)??
        };

        let context = retrieve(
            &index,
            self.embedder.as_ref(),
            question,
            self.config.retrieval.k,
        )
        .await?;
        let answer = answer(self.chat.as_ref(), &context, question).await?;

        tracing::info!(
            indexed = index.len(),
            context_chars = context.len(),
            "answered question"
        );
        Ok(AskResponse { answer, context })
    }

    /// Stage `file` in a temp file, extract its pages, and remove the temp
    /// file whether or not extraction succeeded.
    async fn extract_upload(&self, file: UploadedFile) -> Result<Vec<Page>> {
        let upload_dir = self.config.server.upload_dir();
        let suffix = file
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let UploadedFile { file_name, bytes } = file;

        let extracted = tokio::task::spawn_blocking(
            move || -> std::io::Result<std::result::Result<Vec<Page>, ExtractError>> {
                std::fs::create_dir_all(&upload_dir)?;
                let mut staged = tempfile::Builder::new()
                    .prefix("upload-")
                    .suffix(&suffix)
                    .tempfile_in(&upload_dir)?;
                staged.write_all(&bytes)?;
                staged.flush()?;
                Ok(extract_pages(staged.path()))
            },
        )
        .await
        .map_err(join_error)??;

        extracted.map_err(|source| Error::Extraction {
            file: file_name,
            source,
        })
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(err))
}
