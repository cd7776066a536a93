//! Error taxonomy for the ingest and ask workflows.
//!
//! Every stage of the pipeline reports failures through [`Error`]. Nothing
//! retries or recovers internally; the variant tells the HTTP layer which
//! status code to answer with (see [`crate::server`]).

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;

/// Failures surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    /// A document could not be read, was corrupt, or had an unsupported type.
    #[error("failed to extract text from {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },

    /// The embedding backend was unreachable or rejected the input.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Nothing has been ingested yet, so there is no index to query.
    #[error("no index available at {}: upload documents first", .0.display())]
    NoIndex(PathBuf),

    /// The persisted index exists but is corrupt or was built by another model.
    #[error("failed to load index: {0}")]
    IndexLoad(String),

    /// The completion backend failed (unavailable, auth, quota).
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn embedding(err: impl std::fmt::Display) -> Self {
        Error::Embedding(err.to_string())
    }

    pub(crate) fn generation(err: impl std::fmt::Display) -> Self {
        Error::Generation(err.to_string())
    }

    pub(crate) fn index_load(err: impl std::fmt::Display) -> Self {
        Error::IndexLoad(err.to_string())
    }
}
