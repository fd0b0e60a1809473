// src/llm/mod.rs
//
// Generation service seam. The repair loop only sees `ChatModel`; the HTTP
// client and the test fakes both implement it.

pub mod client;
pub mod prompt;

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::GenerationError;

pub use client::{LlmClient, Provider, ProviderConfig};
pub use prompt::{PromptAssembler, PromptContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation: one system message, then user followups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn system(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

pub trait ChatModel {
    /// Primary completion for `request`. Must return `Cancelled` promptly
    /// once `cancel` is set.
    fn complete(&self, request: &ChatRequest, cancel: &CancelToken)
        -> Result<String, GenerationError>;
}
