use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CreatorPilotError, Result};
use crate::interfaces::providers::{
    ChatRole, Completion, CompletionRequest, LlmProvider, ProviderKind,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GoogleProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            http: super::http_client(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let contents: Vec<Value> = request
            .conversation()
            .map(|message| {
                let role = match message.role {
                    ChatRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": message.content}]})
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            },
        });
        if let Some(system) = request.system_prompt() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }

    fn parse_response(response: &Value, requested_model: &str) -> Result<Completion> {
        let content = response
            .get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| CreatorPilotError::Provider("google returned no candidates".to_string()))?;
        let usage = response.get("usageMetadata");
        let token_count = |field: &str| {
            usage
                .and_then(|usage| usage.get(field))
                .and_then(|value| value.as_u64())
                .unwrap_or(0) as u32
        };
        Ok(Completion {
            content,
            model: response
                .get("modelVersion")
                .and_then(|value| value.as_str())
                .unwrap_or(requested_model)
                .to_string(),
            input_tokens: token_count("promptTokenCount"),
            output_tokens: token_count("candidatesTokenCount"),
        })
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            request.model
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("google transport failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreatorPilotError::Http(format!("google read failed: {e}")))?;
        if !status.is_success() {
            return Err(super::status_error(ProviderKind::Google, status, &body));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| CreatorPilotError::Serialization(format!("google decode failed: {e}")))?;
        Self::parse_response(&value, &request.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::providers::ChatMessage;

    #[test]
    fn assistant_turns_become_model_role() {
        let request = CompletionRequest {
            model: "gemini-1.5-flash".to_string(),
            messages: vec![
                ChatMessage::system("Answer as an SEO expert."),
                ChatMessage::user("tags?"),
                ChatMessage::assistant("use long-tail"),
            ],
            max_tokens: 256,
            temperature: 0.7,
        };
        let body = GoogleProvider::build_body(&request);
        assert_eq!(body["contents"][1]["role"], json!("model"));
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            json!("Answer as an SEO expert.")
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], json!(256));
    }

    #[test]
    fn parses_candidate_text_and_usage() {
        let value = json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 9},
            "modelVersion": "gemini-1.5-flash-002"
        });
        let completion = GoogleProvider::parse_response(&value, "gemini").unwrap();
        assert_eq!(completion.content, "ab");
        assert_eq!(completion.output_tokens, 9);
        assert_eq!(completion.model, "gemini-1.5-flash-002");
    }
}
