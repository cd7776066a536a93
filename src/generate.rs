//! Answer generation with a chat-completion backend.
//!
//! The prompt restricts the model to the retrieved context and tells it to
//! say it cannot answer when the context is insufficient. Backends:
//! - **[`OpenAIChat`]**: `POST {url}/chat/completions`.
//! - **[`OllamaChat`]**: `POST {url}/api/chat` with `stream: false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Fixed instruction prompt. `{context}` and `{question}` are substituted verbatim.
pub const PROMPT_TEMPLATE: &str = "You are a reliable expert assistant. Use only the provided context and basic reasoning to answer questions. Do not speculate or fabricate. If the context is insufficient, say you cannot answer.

Context:
{context}

Question: {question}
";

/// Fill [`PROMPT_TEMPLATE`].
pub fn format_prompt(context: &str, question: &str) -> String {
    // Single pass so a `{question}` inside the context is left alone.
    let (head, tail) = PROMPT_TEMPLATE
        .split_once("{context}")
        .unwrap_or((PROMPT_TEMPLATE, ""));
    format!("{}{}{}", head, context, tail.replacen("{question}", question, 1))
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Answer `question` from `context`.
pub async fn answer(chat: &dyn ChatModel, context: &str, question: &str) -> Result<String> {
    let prompt = format_prompt(context, question);
    let reply = chat.complete(&prompt).await?;
    tracing::debug!(model = chat.model_name(), chars = reply.len(), "generated answer");
    Ok(reply)
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(Error::generation)
}

// ============ OpenAI ============

pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::Generation("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(Error::generation)?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Generation("invalid OpenAI response: missing choices[0].message.content".into())
            })
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "options": {"temperature": self.temperature},
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Generation(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(Error::generation)?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Generation("invalid Ollama response: missing message.content".into()))
    }
}

/// Build the chat backend named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(Error::Generation(format!("unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            url: Some(server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = format_prompt("The sky is blue.", "What color is the sky?");
        assert!(prompt.starts_with("You are a reliable expert assistant."));
        assert!(prompt.contains("If the context is insufficient, say you cannot answer."));
        assert!(prompt.contains("Context:\nThe sky is blue.\n\nQuestion: What color is the sky?"));
    }

    #[test]
    fn placeholders_in_context_are_not_expanded() {
        let prompt = format_prompt("literal {question} here", "real?");
        assert!(prompt.contains("literal {question} here"));
        assert!(prompt.ends_with("Question: real?\n"));
    }

    #[tokio::test]
    async fn openai_sends_model_and_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.5,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Blue."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAIChat::with_api_key(&config_for(&server), "sk-test").unwrap();
        let reply = answer(&chat, "The sky is blue.", "Sky color?").await.unwrap();
        assert_eq!(reply, "Blue.");
    }

    #[tokio::test]
    async fn openai_quota_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string(r#"{"error":"insufficient_quota"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let chat = OpenAIChat::with_api_key(&config_for(&server), "sk-test").unwrap();
        let err = chat.complete("hi").await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("insufficient_quota")));
    }

    #[tokio::test]
    async fn ollama_reads_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "I cannot answer from the context."}
            })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&LlmConfig {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            ..config_for(&server)
        })
        .unwrap();
        assert_eq!(
            chat.complete("prompt").await.unwrap(),
            "I cannot answer from the context."
        );
    }
}
