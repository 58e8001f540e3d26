use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CreatorPilotError, Result};
use crate::interfaces::providers::{
    ChatRole, Completion, CompletionRequest, LlmProvider, ProviderKind,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            http: super::http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .conversation()
            .map(|message| {
                let role = match message.role {
                    ChatRole::Assistant => "assistant",
                    _ => "user",
                };
                json!({"role": role, "content": message.content})
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if let Some(system) = request.system_prompt() {
            body["system"] = Value::String(system);
        }
        body
    }

    fn parse_response(response: &Value, requested_model: &str) -> Result<Completion> {
        let content = response
            .get("content")
            .and_then(|blocks| blocks.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| CreatorPilotError::Provider("anthropic returned no text".to_string()))?;
        let usage = response.get("usage");
        let token_count = |field: &str| {
            usage
                .and_then(|usage| usage.get(field))
                .and_then(|value| value.as_u64())
                .unwrap_or(0) as u32
        };
        Ok(Completion {
            content,
            model: response
                .get("model")
                .and_then(|value| value.as_str())
                .unwrap_or(requested_model)
                .to_string(),
            input_tokens: token_count("input_tokens"),
            output_tokens: token_count("output_tokens"),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("anthropic transport failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("anthropic read failed: {e}")))?;
        if !status.is_success() {
            return Err(super::status_error(ProviderKind::Anthropic, status, &body));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| CreatorPilotError::Serialization(format!("anthropic decode failed: {e}")))?;
        Self::parse_response(&value, &request.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::providers::ChatMessage;

    #[test]
    fn system_prompt_moves_out_of_messages() {
        let request = CompletionRequest {
            model: "claude-3-5-haiku-latest".to_string(),
            messages: vec![ChatMessage::system("Be brief."), ChatMessage::user("hello")],
            max_tokens: 300,
            temperature: 0.2,
        };
        let body = AnthropicProvider::build_body(&request);
        assert_eq!(body["system"], json!("Be brief."));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], json!(300));
    }

    #[test]
    fn joins_text_blocks() {
        let value = json!({
            "model": "claude-x",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t"},
                {"type": "text", "text": "there"}
            ],
            "usage": {"input_tokens": 7, "output_tokens": 2}
        });
        let completion = AnthropicProvider::parse_response(&value, "fallback").unwrap();
        assert_eq!(completion.content, "Hello there");
        assert_eq!(completion.input_tokens, 7);
        assert!(AnthropicProvider::parse_response(&json!({"content": []}), "m").is_err());
    }
}
