// src/llm/client.rs

use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::error::{ConfigError, GenerationError};
use crate::llm::{ChatModel, ChatRequest};

const PROMPT_ABI_VERSION: &str = "v1-gotestgen";

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn key_env(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-5",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    cfg: ProviderConfig,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(cfg: ProviderConfig) -> Result<Self, GenerationError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { cfg, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }
}

impl ChatModel for LlmClient {
    /// Sends the request on a worker thread and waits for it, giving up as
    /// soon as `cancel` is set. No retries.
    fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancelToken,
    ) -> Result<String, GenerationError> {
        tracing::debug!(
            provider = self.cfg.provider.name(),
            model = %self.cfg.model,
            messages = request.messages.len(),
            digest = %hash_request(request),
            "sending generation request"
        );

        let (url, headers, body) = build_request(&self.cfg, request);
        let http = self.http.clone();
        let provider = self.cfg.provider;

        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(send(&http, provider, &url, headers, &body));
        });

        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(GenerationError::Disconnected),
            }
        }
    }
}

fn send(
    http: &reqwest::blocking::Client,
    provider: Provider,
    url: &str,
    headers: Vec<(&'static str, String)>,
    body: &Value,
) -> Result<String, GenerationError> {
    let mut req = http.post(url).json(body);
    for (k, v) in headers {
        req = req.header(k, v);
    }

    let resp = req.send()?;
    let status = resp.status();
    let text = resp.text()?;

    if !status.is_success() {
        return Err(GenerationError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    let json: Value =
        serde_json::from_str(&text).map_err(|e| GenerationError::Response(e.to_string()))?;
    extract_text(provider, &json)
}

fn hash_request(request: &ChatRequest) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    for m in &request.messages {
        h.update(m.content.as_bytes());
    }
    hex::encode(h.finalize())
}

fn build_request(
    cfg: &ProviderConfig,
    request: &ChatRequest,
) -> (String, Vec<(&'static str, String)>, Value) {
    match cfg.provider {
        Provider::OpenAI => {
            let url = cfg.base_url.clone().unwrap_or_else(|| OPENAI_URL.into());

            let body = serde_json::json!({
                "model": cfg.model,
                "messages": request.messages,
            });

            (
                url,
                vec![("Authorization", format!("Bearer {}", cfg.api_key))],
                body,
            )
        }

        Provider::Anthropic => {
            let url = cfg.base_url.clone().unwrap_or_else(|| ANTHROPIC_URL.into());

            let mut messages: Vec<Value> = request
                .user_messages()
                .map(|c| serde_json::json!({ "role": "user", "content": c }))
                .collect();
            if messages.is_empty() {
                messages.push(serde_json::json!({ "role": "user", "content": "Write the test." }));
            }

            let body = serde_json::json!({
                "model": cfg.model,
                "max_tokens": ANTHROPIC_MAX_TOKENS,
                "system": request.system().unwrap_or_default(),
                "messages": messages,
            });

            (
                url,
                vec![
                    ("x-api-key", cfg.api_key.clone()),
                    ("anthropic-version", ANTHROPIC_VERSION.into()),
                ],
                body,
            )
        }
    }
}

fn extract_text(provider: Provider, v: &Value) -> Result<String, GenerationError> {
    let text = match provider {
        Provider::OpenAI => v.pointer("/choices/0/message/content"),
        Provider::Anthropic => v.pointer("/content/0/text"),
    };
    text.and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            GenerationError::Response(format!("{} response has no text content", provider.name()))
        })
}
