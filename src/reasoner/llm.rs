//! The LLM client seam: `LlmClient` is what the Reasoner depends on,
//! `OpenRouterClient` is the production implementation (grounded in this
//! codebase's existing OpenRouter chat-completions client), `FakeLlmClient`
//! is a scriptable test double.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// What the reasoner asks of any LLM backend: a raw text completion for a
/// fully-formed prompt, honoring the given timeout.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub enum LlmError {
    Timeout,
    Transport(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "LLM call timed out"),
            Self::Transport(msg) => write!(f, "LLM transport error: {msg}"),
        }
    }
}

impl std::error::Error for LlmError {}

/// The parsed, schema-validated shape the reasoner expects back from the
/// model — the wire JSON is decoded into this before any classification
/// logic runs, so a malformed reply is a distinguishable, typed failure
/// rather than a missing map key three call-sites away.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLlmResponse {
    pub classification: String,
    pub confidence: f64,
    pub explanation: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

// --- Production client -----------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: String,
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build http client: {e}"))?;
        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
        };

        let send = self
            .http
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        let resp = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(LlmError::Transport(e.to_string())),
            Err(_) => return Err(LlmError::Timeout),
        };

        if !resp.status().is_success() {
            return Err(LlmError::Transport(format!("http {}", resp.status())));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("response decode: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Transport("empty choices array".to_string()))
    }
}

// --- Test double --------------------------------------------------------

enum ScriptedReply {
    Content(String),
    Timeout,
    Transport(String),
}

/// Scriptable `LlmClient` for the Reasoner test suite and integration
/// tests. Replies are consumed in FIFO order; once exhausted it repeats the
/// last reply so an over-long test doesn't panic on an empty queue.
pub struct FakeLlmClient {
    replies: Mutex<Vec<ScriptedReply>>,
    call_count: Mutex<u32>,
}

impl FakeLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    pub fn push_reply(&self, json_body: impl Into<String>) {
        self.replies.lock().push(ScriptedReply::Content(json_body.into()));
    }

    pub fn push_timeout(&self) {
        self.replies.lock().push(ScriptedReply::Timeout);
    }

    pub fn push_transport_error(&self, msg: impl Into<String>) {
        self.replies.lock().push(ScriptedReply::Transport(msg.into()));
    }

    pub fn call_count(&self) -> u32 {
        *self.call_count.lock()
    }
}

impl Default for FakeLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, LlmError> {
        *self.call_count.lock() += 1;
        let mut guard = self.replies.lock();
        if guard.is_empty() {
            warn!("FakeLlmClient called with no scripted reply remaining");
            return Ok(
                r#"{"classification":"NATURAL","confidence":0.0,"explanation":"no script","evidence":[]}"#
                    .to_string(),
            );
        }
        let reply = if guard.len() == 1 {
            match &guard[0] {
                ScriptedReply::Content(s) => ScriptedReply::Content(s.clone()),
                ScriptedReply::Timeout => ScriptedReply::Timeout,
                ScriptedReply::Transport(s) => ScriptedReply::Transport(s.clone()),
            }
        } else {
            guard.remove(0)
        };
        drop(guard);

        match reply {
            ScriptedReply::Content(s) => Ok(s),
            ScriptedReply::Timeout => Err(LlmError::Timeout),
            ScriptedReply::Transport(msg) => Err(LlmError::Transport(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_replies_in_order() {
        let fake = FakeLlmClient::new();
        fake.push_reply("first");
        fake.push_reply("second");

        assert_eq!(
            fake.complete("prompt", Duration::from_secs(1)).await.unwrap(),
            "first"
        );
        assert_eq!(
            fake.complete("prompt", Duration::from_secs(1)).await.unwrap(),
            "second"
        );
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test]
    async fn fake_client_surfaces_scripted_timeout() {
        let fake = FakeLlmClient::new();
        fake.push_timeout();
        let result = fake.complete("prompt", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LlmError::Timeout)));
    }

    #[test]
    fn raw_response_deserializes_minimal_shape() {
        let json = r#"{"classification":"FLASH_LOAN_ATTACK","confidence":0.92,"explanation":"x","evidence":["a","b"]}"#;
        let parsed: RawLlmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.classification, "FLASH_LOAN_ATTACK");
        assert_eq!(parsed.evidence.len(), 2);
    }
}
