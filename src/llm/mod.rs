//! Language-model capability
//!
//! Given the recent conversation and a set of tool schemas, a model answers
//! with either plain text or a single tool invocation. Agents treat every
//! invocation as untrusted input and run it through the tool's validation.

pub mod gemini;

use crate::error::AdvisorError;
use crate::memory::Turn;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

pub use gemini::GeminiClient;

/// Function declaration offered to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    /// Prior turns, oldest first, excluding `message`
    pub history: Vec<Turn>,
    pub message: String,
    pub tools: Vec<ToolSchema>,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            message: message.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: &[Turn]) -> Self {
        self.history = history.to_vec();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    Reply(String),
    ToolCall { name: String, arguments: Value },
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    fn name(&self) -> &str;
}

/// Used when no API key is configured; agents fall back to deterministic parsing
#[derive(Debug, Default)]
pub struct OfflineLanguageModel;

#[async_trait::async_trait]
impl LanguageModel for OfflineLanguageModel {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse> {
        Err(AdvisorError::LlmError(
            "no language model configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Serves queued responses in order and records every request.
/// Errors once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedLanguageModel {
    responses: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLanguageModel {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, response: LlmResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| AdvisorError::Internal("scripted model lock poisoned".to_string()))?
            .pop_front();

        next.ok_or_else(|| AdvisorError::LlmError("script exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_offline_model_always_fails() {
        let model = OfflineLanguageModel;
        let result = model.complete(&LlmRequest::new("system", "hello")).await;
        assert!(matches!(result, Err(AdvisorError::LlmError(_))));
    }

    #[tokio::test]
    async fn test_scripted_model_serves_in_order() {
        let model = ScriptedLanguageModel::new(vec![
            LlmResponse::ToolCall {
                name: "set_currency".into(),
                arguments: json!({"currency": "USD"}),
            },
            LlmResponse::Reply("hello".into()),
        ]);

        let first = model.complete(&LlmRequest::new("s", "one")).await.unwrap();
        assert!(matches!(first, LlmResponse::ToolCall { .. }));
        let second = model.complete(&LlmRequest::new("s", "two")).await.unwrap();
        assert_eq!(second, LlmResponse::Reply("hello".into()));
        assert!(model.complete(&LlmRequest::new("s", "three")).await.is_err());

        let seen: Vec<String> = model.requests().into_iter().map(|r| r.message).collect();
        assert_eq!(seen, vec!["one", "two", "three"]);
    }
}
