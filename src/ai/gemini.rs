use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::session::{ChatRequest, ChatTransport};
use crate::error::TutorError;
use crate::state::Message;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, TutorError> {
        if api_key.trim().is_empty() {
            return Err(TutorError::MissingApiKey);
        }

        Ok(Self {
            client: Client::builder().build()?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    async fn generate(&self, request: &ChatRequest) -> Result<String, TutorError> {
        let body = build_request(request);

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(TutorError::from_status(status.as_u16(), message));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| TutorError::Api {
                status: status.as_u16(),
                message: format!("failed to parse response: {}", e),
            })?;

        extract_text(parsed)
    }
}

fn build_request(request: &ChatRequest) -> GeminiRequest {
    let contents = request.turns.iter().map(content_from_message).collect();

    let system_instruction = if request.system_instruction.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(request.system_instruction.clone()),
            }],
        })
    };

    GeminiRequest {
        contents,
        system_instruction,
    }
}

fn content_from_message(message: &Message) -> GeminiContent {
    GeminiContent {
        role: Some(message.role.as_str().to_string()),
        parts: vec![GeminiPart {
            text: Some(message.content.clone()),
        }],
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GeminiResponse) -> Result<String, TutorError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(TutorError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "be kind".to_string(),
            turns: vec![
                Message::user("hi"),
                Message::model("hello"),
                Message::user("explain tides"),
            ],
        }
    }

    #[test]
    fn test_request_shape() {
        let json = serde_json::to_value(build_request(&request())).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be kind");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "explain tides");
    }

    #[test]
    fn test_empty_system_instruction_is_omitted() {
        let mut req = request();
        req.system_instruction.clear();
        let json = serde_json::to_value(build_request(&req)).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello, "},{"text":"world"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello, world");
    }

    #[test]
    fn test_extract_text_without_candidates() {
        let response: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(matches!(extract_text(response), Err(TutorError::EmptyResponse)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new("key", "http://localhost:8080/").unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(
            GeminiClient::new("  ", "http://localhost"),
            Err(TutorError::MissingApiKey)
        ));
    }
}
