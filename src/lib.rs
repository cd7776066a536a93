//! # docqa
//!
//! Ask questions about PDF documents. Uploaded files are extracted page by
//! page, split into overlapping segments, embedded, and stored in a single
//! on-disk vector index. Questions are answered by a chat model that sees
//! only the segments most similar to the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌───────────────┐
//! │ /upload  │──▶│ Extract │──▶│  Chunk  │──▶│ Embed + Index │──▶ index dir
//! └──────────┘   └─────────┘   └─────────┘   └───────────────┘
//!
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │   /ask   │──▶│ Load index │──▶│ Retrieve │──▶│ Generate │──▶ {answer, context}
//! └──────────┘   └────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! docqa serve                              # HTTP API on 127.0.0.1:8000
//! docqa ingest ./manuals/                  # index every PDF under a directory
//! docqa ask "What is the warranty period?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Page-level document text extraction |
//! | [`chunk`] | Recursive character chunking |
//! | [`embedding`] | Embedding backends |
//! | [`index`] | Vector index, persistence, nearest-neighbour search |
//! | [`retrieve`] | Context retrieval |
//! | [`generate`] | Prompting and chat-completion backends |
//! | [`service`] | Ingest and ask workflows |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod service;

pub use error::{Error, Result};
