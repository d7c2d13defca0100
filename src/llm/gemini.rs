//! Gemini API client
//!
//! Sends the conversation with function declarations to `generateContent` and
//! maps the first candidate to a reply or a function call.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, LlmRequest, LlmResponse, ToolSchema};
use crate::error::AdvisorError;
use crate::memory::Speaker;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AdvisorError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdvisorError::LlmError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent?key={}", BASE_URL, self.model, self.api_key)
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = GeminiRequest::from_request(request);

        info!(model = %self.model, tools = request.tools.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AdvisorError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response: {}", error_text);
            return Err(AdvisorError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AdvisorError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        gemini_response.into_llm_response()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

//
// ================= Wire format =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

impl GeminiRequest {
    fn from_request(request: &LlmRequest) -> Self {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|turn| {
                let role = match turn.speaker {
                    Speaker::User => "user",
                    Speaker::Assistant => "model",
                };
                Content::text(Some(role), &turn.text)
            })
            .collect();
        contents.push(Content::text(Some("user"), &request.message));

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: request.tools.clone(),
            }]
        };

        Self {
            contents,
            system_instruction: Content::text(None, &request.system_prompt),
            tools,
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
                function_call: None,
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<ToolSchema>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

impl GeminiResponse {
    /// A function call anywhere in the first candidate wins over its text
    fn into_llm_response(self) -> Result<LlmResponse> {
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| AdvisorError::LlmError("No response from Gemini API".to_string()))?;

        let mut texts = Vec::new();
        for part in content.parts {
            if let Some(call) = part.function_call {
                return Ok(LlmResponse::ToolCall {
                    name: call.name,
                    arguments: call.args,
                });
            }
            if let Some(text) = part.text {
                texts.push(text);
            }
        }

        let reply = texts.join("").trim().to_string();
        if reply.is_empty() {
            return Err(AdvisorError::LlmError("Empty response from Gemini".to_string()));
        }
        Ok(LlmResponse::Reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Turn;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = LlmRequest::new("be brief", "USA and India")
            .with_history(&[Turn::user("hi"), Turn::assistant("INR or USD?", None)])
            .with_tools(vec![ToolSchema {
                name: "set_geography".into(),
                description: "Record markets".into(),
                parameters: json!({"type": "object"}),
            }]);

        let body = serde_json::to_value(GeminiRequest::from_request(&request)).unwrap();

        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "USA and India");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "set_geography");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_function_call_response() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "set_currency", "args": {"currency": "USD"}}}]
                },
                "finishReason": "STOP"
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();

        match response.into_llm_response().unwrap() {
            LlmResponse::ToolCall { name, arguments } => {
                assert_eq!(name, "set_currency");
                assert_eq!(arguments["currency"], "USD");
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_text_response_and_empty_candidates() {
        let raw = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}}]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            response.into_llm_response().unwrap(),
            LlmResponse::Reply("Hello there".into())
        );

        let empty: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(empty.into_llm_response().is_err());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        assert!(matches!(
            GeminiClient::new("", "gemini-2.0-flash"),
            Err(AdvisorError::ConfigError(_))
        ));
    }
}
