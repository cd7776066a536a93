//! Helpers shared by the integration tests: a PDF writer, deterministic
//! embedding and chat backends, and service/server setup.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docqa::config::{parse_config, Config};
use docqa::embedding::Embedder;
use docqa::generate::ChatModel;
use docqa::service::QaService;
use tempfile::TempDir;

pub const DECLINE: &str = "I cannot answer that from the provided context.";

/// Minimal valid PDF with one page per entry of `pages`, each drawn with a
/// single `Tj` operator in Helvetica. Offsets in the xref table are exact so
/// pdf-extract parses it without repair.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let mut offsets = Vec::new();
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids, page_count
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_obj = 4 + 2 * i;
        let content_obj = page_obj + 1;
        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let stream = format!("BT /F1 10 Tf 20 700 Td ({}) Tj ET", escaped);

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj, content_obj
            )
            .as_bytes(),
        );

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_obj,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// Exactly `n` characters of space-separated prose, drawn from `topic`.
pub fn prose(topic: &str, n: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.chars().count() < n {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("{}{}", topic, i));
        i += 1;
    }
    text.chars().take(n).collect()
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Bag-of-words embedder: each lowercase word increments one of 64 buckets
/// chosen by FNV-1a. Deterministic and cheap.
pub struct HashingEmbedder;

pub const HASH_DIMS: usize = 64;

fn bucket(word: &str) -> usize {
    let hash = word.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    });
    (hash % HASH_DIMS as u64) as usize
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-bow-64"
    }
    fn dims(&self) -> usize {
        HASH_DIMS
    }
    async fn embed(&self, texts: &[String]) -> docqa::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; HASH_DIMS];
                for w in words(text) {
                    v[bucket(&w)] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat backend that follows the prompt's contract mechanically: it answers
/// with the first context segment when the context mentions any of the
/// question's longer words, and declines otherwise. Prompts are recorded.
#[derive(Default)]
pub struct ContextBoundChat {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for ContextBoundChat {
    fn model_name(&self) -> &str {
        "context-bound"
    }

    async fn complete(&self, prompt: &str) -> docqa::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let (_, rest) = prompt.split_once("Context:\n").unwrap_or(("", ""));
        let (context, question) = rest.split_once("\n\nQuestion: ").unwrap_or((rest, ""));
        let context_lower = context.to_lowercase();

        let grounded = words(question)
            .filter(|w| w.len() >= 5)
            .any(|w| context_lower.contains(&w));
        if grounded {
            let first = context.split("\n\n").next().unwrap_or_default();
            Ok(format!("According to the documents: {}", first))
        } else {
            Ok(DECLINE.to_string())
        }
    }
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub config: Config,
}

impl TestEnv {
    pub fn new(port: u16) -> Self {
        let tmp = TempDir::new().unwrap();
        let config = parse_config(&format!(
            r#"
[index]
path = "{root}/data/index"

[server]
bind = "127.0.0.1:{port}"
upload_dir = "{root}/uploads"
"#,
            root = tmp.path().display(),
            port = port
        ))
        .unwrap();
        Self { tmp, config }
    }

    pub fn index_path(&self) -> PathBuf {
        self.config.index.path.clone()
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.config.server.upload_dir()
    }

    /// Files left behind in the upload staging directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.upload_dir()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn service(&self, chat: Arc<ContextBoundChat>) -> QaService {
        QaService::new(self.config.clone(), Arc::new(HashingEmbedder), chat)
    }
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}
