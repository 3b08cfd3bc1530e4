//! Model client abstraction
//!
//! The router depends only on `ModelClient`; the live Anthropic client and the
//! scripted fake used in tests both implement it.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Text completion over an ordered conversation. Called at most once per query.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, ModelError>;
}

/// Scripted client for tests: returns a fixed response or error and records
/// every conversation it was given.
pub struct FakeModelClient {
    response: Result<String, ModelError>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl FakeModelClient {
    pub fn responding(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ModelError) -> Self {
        Self {
            response: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Conversations received so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        self.response.clone()
    }
}
