//! In-process vector similarity index and its on-disk form.
//!
//! A [`VectorIndex`] is an ordered list of `(segment, vector)` pairs plus the
//! model name and dimensionality that produced the vectors. Search is
//! brute-force cosine similarity, which is plenty for the few thousand
//! segments a handful of uploaded PDFs produce.
//!
//! # Layout on disk
//!
//! ```text
//! <index.path>/
//! ├── index.json    manifest: format version, model, dims, count, built_at, segments
//! └── vectors.bin   count × dims little-endian f32 values, row-major
//! ```
//!
//! [`persist`](VectorIndex::persist) writes into a sibling staging directory
//! and swaps it in by rename, so the previous index is replaced as a whole.
//! [`load`](VectorIndex::load) validates the manifest against the vector file
//! and the active embedder before trusting anything in it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{Error, Result};

const MANIFEST_FILE: &str = "index.json";
const VECTORS_FILE: &str = "vectors.bin";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    model: String,
    dims: usize,
    count: usize,
    built_at: DateTime<Utc>,
    segments: Vec<String>,
}

/// A searchable set of embedded text segments.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    segments: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'a> {
    /// Insertion position of the segment.
    pub position: usize,
    pub segment: &'a str,
    /// Cosine similarity to the query.
    pub score: f32,
}

impl VectorIndex {
    /// Embed every segment (order preserved) and index the vectors.
    pub async fn build(embedder: &dyn Embedder, segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::Embedding(
                "no text segments to embed; the documents contained no extractable text"
                    .to_string(),
            ));
        }

        let vectors = embedder.embed(&segments).await?;
        if vectors.len() != segments.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, embedder returned {}",
                segments.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dims()) {
            return Err(Error::Embedding(format!(
                "model {} returned a {}-dimensional vector, expected {}",
                embedder.model_name(),
                bad.len(),
                embedder.dims()
            )));
        }

        Ok(Self {
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
            segments,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The `k` segments most similar to `query`, best first. Ties keep
    /// insertion order. Returns fewer than `k` only when the index is smaller.
    pub fn k_nearest(&self, query: &[f32], k: usize) -> Vec<Neighbor<'_>> {
        let mut hits: Vec<Neighbor<'_>> = self
            .vectors
            .iter()
            .zip(self.segments.iter())
            .enumerate()
            .map(|(position, (vector, segment))| Neighbor {
                position,
                segment,
                score: cosine_similarity(query, vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    /// Write the index to `dir`, replacing whatever was there.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.dims,
            count: self.segments.len(),
            built_at: Utc::now(),
            segments: self.segments.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut blob = Vec::with_capacity(self.segments.len() * self.dims * 4);
        for vector in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(vector));
        }

        let staging = sibling(dir, "staging")?;
        std::fs::create_dir_all(&staging)?;
        let written = std::fs::write(staging.join(MANIFEST_FILE), json)
            .and_then(|_| std::fs::write(staging.join(VECTORS_FILE), blob));
        if let Err(e) = written {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        if let Err(e) = swap_in(&staging, dir) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        tracing::debug!(
            path = %dir.display(),
            segments = self.segments.len(),
            "persisted index"
        );
        Ok(())
    }

    /// Load the index persisted at `dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoIndex`] if nothing has been persisted at `dir`.
    /// - [`Error::IndexLoad`] if the files are corrupt, inconsistent, or were
    ///   produced by a different model or dimensionality than `embedder`.
    pub fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        if !dir.exists() {
            return Err(Error::NoIndex(dir.to_path_buf()));
        }

        let manifest_bytes = std::fs::read(dir.join(MANIFEST_FILE))
            .map_err(|e| Error::IndexLoad(format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| Error::IndexLoad(format!("malformed {}: {}", MANIFEST_FILE, e)))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::IndexLoad(format!(
                "unsupported index format version {}",
                manifest.format_version
            )));
        }
        if manifest.dims == 0 {
            return Err(Error::index_load("index declares zero dimensions"));
        }
        if manifest.count != manifest.segments.len() {
            return Err(Error::IndexLoad(format!(
                "manifest lists {} segments but declares {}",
                manifest.segments.len(),
                manifest.count
            )));
        }
        if manifest.model != embedder.model_name() || manifest.dims != embedder.dims() {
            return Err(Error::IndexLoad(format!(
                "index was built with {} ({} dims) but the configured embedder is {} ({} dims); re-upload the documents",
                manifest.model,
                manifest.dims,
                embedder.model_name(),
                embedder.dims()
            )));
        }

        let blob = std::fs::read(dir.join(VECTORS_FILE))
            .map_err(|e| Error::IndexLoad(format!("cannot read {}: {}", VECTORS_FILE, e)))?;
        let expected = manifest.count * manifest.dims * 4;
        if blob.len() != expected {
            return Err(Error::IndexLoad(format!(
                "{} holds {} bytes, expected {}",
                VECTORS_FILE,
                blob.len(),
                expected
            )));
        }

        let vectors = blob
            .chunks_exact(manifest.dims * 4)
            .map(blob_to_vec)
            .collect();

        Ok(Self {
            model: manifest.model,
            dims: manifest.dims,
            segments: manifest.segments,
            vectors,
        })
    }
}

/// Move `staging` to `dir`. An existing `dir` is retired first and put back
/// if the staging directory cannot take its place.
fn swap_in(staging: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::rename(staging, dir)?;
        return Ok(());
    }

    let retired = sibling(dir, "old")?;
    std::fs::rename(dir, &retired)?;
    if let Err(e) = std::fs::rename(staging, dir) {
        if let Err(restore) = std::fs::rename(&retired, dir) {
            tracing::error!(
                "could not restore previous index from {}: {}",
                retired.display(),
                restore
            );
        }
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_dir_all(&retired) {
        tracing::warn!("could not remove retired index {}: {}", retired.display(), e);
    }
    Ok(())
}

/// `<parent>/.<name>.<tag>-<uuid>`, next to `dir` so renames stay on one filesystem.
fn sibling(dir: &Path, tag: &str) -> Result<PathBuf> {
    let name = dir.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("index path {} has no directory name", dir.display()),
        )
    })?;
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    Ok(parent.join(format!(".{}.{}-{}", name, tag, Uuid::new_v4())))
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
