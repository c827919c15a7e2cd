use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skydesk_core::config::{LlmConfig, LlmProvider};
use thiserror::Error;
use tracing::warn;

use crate::transcript::{ChatMessage, ToolCall};

/// A tool advertised to the model: name, description, and the JSON schema
/// of its arguments.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// What the model produced for one request: free text, tool calls, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOutcome {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response could not be parsed: {0}")]
    MalformedResponse(String),
    #[error("llm response contained neither text nor tool calls")]
    EmptyResponse,
    #[error("llm request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, LlmError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
        LlmProvider::Ollama => "http://localhost:11434/v1",
    }
}

/// Chat-completions client for any OpenAI-compatible backend (OpenAI,
/// OpenRouter, Ollama's `/v1` surface). Retries transport failures and
/// 429/5xx statuses with exponential backoff.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    retry_policy: RetryPolicy,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            retry_policy: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    fn encode_request(&self, request: &ChatRequest) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(encode_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunctionSpec {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        }
    }

    async fn send_once(&self, url: &str, payload: &WireRequest) -> Result<ChatOutcome, LlmError> {
        let mut request = self.http.post(url).json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response =
            request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let body =
            response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body: excerpt(&body) });
        }

        decode_response(&body)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatOutcome, LlmError> {
        let payload = self.encode_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = String::new();
        for attempt in 0..=self.retry_policy.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_policy.backoff(attempt - 1)).await;
            }

            match self.send_once(&url, &payload).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_retryable() => {
                    warn!(
                        attempt,
                        max_retries = self.retry_policy.max_retries,
                        error = %error,
                        "llm request failed; will retry"
                    );
                    last_error = error.to_string();
                }
                Err(error) => return Err(error),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.retry_policy.max_retries + 1,
            last_error,
        })
    }
}

fn encode_message(message: &ChatMessage) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };

    // Assistant tool-call messages carry no content on the wire.
    let content = if message.content.is_empty() && tool_calls.is_some() {
        None
    } else {
        Some(message.content.clone())
    };

    WireMessage {
        role: message.role.as_str(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn decode_response(body: &str) -> Result<ChatOutcome, LlmError> {
    let response: WireResponse = serde_json::from_str(body)
        .map_err(|error| LlmError::MalformedResponse(error.to_string()))?;
    let choice = response.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;

    let mut tool_calls = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        let raw_arguments = call.function.arguments.trim();
        let arguments = if raw_arguments.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw_arguments).map_err(|error| {
                LlmError::MalformedResponse(format!(
                    "tool call `{}` carried invalid arguments: {error}",
                    call.function.name
                ))
            })?
        };
        tool_calls.push(ToolCall { id: call.id, name: call.function.name, arguments });
    }

    let text = choice.message.content.filter(|content| !content.trim().is_empty());
    if text.is_none() && tool_calls.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    Ok(ChatOutcome { text, tool_calls })
}

fn excerpt(body: &str) -> String {
    const MAX_CHARS: usize = 240;
    let mut out: String = body.chars().take(MAX_CHARS).collect();
    if body.chars().count() > MAX_CHARS {
        out.push_str("...");
    }
    out
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, per the chat-completions wire format.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use skydesk_core::config::{LlmConfig, LlmProvider};

    use super::{decode_response, default_base_url, LlmError, OpenAiCompatClient, RetryPolicy};
    use crate::llm::{ChatRequest, ToolSpec};
    use crate::transcript::{ChatMessage, ToolCall};

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: Some("sk-test".to_string().into()),
            base_url: Some("https://example.test/v1/".to_string()),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }

    #[test]
    fn decodes_a_plain_text_response() {
        let body = json!({
            "choices": [{ "message": { "content": "Hello there." } }]
        })
        .to_string();

        let outcome = decode_response(&body).expect("response should decode");
        assert_eq!(outcome.text.as_deref(), Some("Hello there."));
        assert!(outcome.tool_calls.is_empty());
    }

    #[test]
    fn decodes_tool_calls_with_encoded_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": {
                            "name": "update_seat",
                            "arguments": "{\"confirmation_number\":\"LL0EZ6\",\"new_seat\":\"23A\"}"
                        }
                    }]
                }
            }]
        })
        .to_string();

        let outcome = decode_response(&body).expect("response should decode");
        assert!(outcome.text.is_none());
        assert_eq!(outcome.tool_calls.len(), 1);
        let call = &outcome.tool_calls[0];
        assert_eq!(call.name, "update_seat");
        assert_eq!(call.arguments["new_seat"], "23A");
    }

    #[test]
    fn empty_argument_strings_decode_to_an_empty_object() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": { "name": "transfer_to_triage_agent", "arguments": "" }
                    }]
                }
            }]
        })
        .to_string();

        let outcome = decode_response(&body).expect("response should decode");
        assert_eq!(outcome.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn a_response_without_choices_is_empty() {
        let body = json!({ "choices": [] }).to_string();
        assert!(matches!(decode_response(&body), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn invalid_tool_arguments_are_a_malformed_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "function",
                        "function": { "name": "faq_lookup", "arguments": "{not json" }
                    }]
                }
            }]
        })
        .to_string();

        let error = decode_response(&body).expect_err("invalid arguments should fail");
        assert!(matches!(error, LlmError::MalformedResponse(_)));
        assert!(error.to_string().contains("faq_lookup"));
    }

    #[test]
    fn retryable_classification_covers_transport_and_server_errors() {
        assert!(LlmError::Transport("timed out".to_string()).is_retryable());
        assert!(LlmError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!LlmError::MalformedResponse("bad".to_string()).is_retryable());
    }

    #[test]
    fn backoff_grows_and_saturates() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 100);
        assert_eq!(policy.backoff(1).as_millis(), 200);
        assert_eq!(policy.backoff(2).as_millis(), 400);
        assert_eq!(policy.backoff(10).as_millis(), 1_000);
    }

    #[test]
    fn encoded_requests_carry_tools_and_tool_results() {
        let client = OpenAiCompatClient::from_config(&test_config())
            .expect("client should build from config");

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("You are a test."),
                ChatMessage::user("change my seat"),
                ChatMessage::assistant_tool_calls(vec![ToolCall {
                    id: "call-1".to_string(),
                    name: "update_seat".to_string(),
                    arguments: json!({ "confirmation_number": "LL0EZ6", "new_seat": "23A" }),
                }]),
                ChatMessage::tool("call-1", "Updated seat to 23A"),
            ],
            tools: vec![ToolSpec {
                name: "update_seat".to_string(),
                description: "Update the seat.".to_string(),
                parameters: json!({ "type": "object" }),
            }],
        };

        let wire = client.encode_request(&request);
        let payload = serde_json::to_value(&wire).expect("wire request should serialize");

        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["tools"][0]["type"], "function");
        assert_eq!(payload["tools"][0]["function"]["name"], "update_seat");

        let messages = payload["messages"].as_array().expect("messages should be an array");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["role"], "assistant");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "update_seat");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call-1");
    }

    #[test]
    fn provider_defaults_cover_all_backends() {
        assert_eq!(default_base_url(LlmProvider::OpenAi), "https://api.openai.com/v1");
        assert_eq!(default_base_url(LlmProvider::OpenRouter), "https://openrouter.ai/api/v1");
        assert_eq!(default_base_url(LlmProvider::Ollama), "http://localhost:11434/v1");
    }
}
