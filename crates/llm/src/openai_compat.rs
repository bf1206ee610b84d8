//! Adapter for any endpoint following the OpenAI chat-completions
//! contract (OpenAI, Azure-style gateways, Ollama, vLLM, LM Studio).

use std::time::Duration;

use serde_json::Value;

use atrium_domain::config::LlmConfig;
use atrium_domain::tool::{
    ChatContent, ChatMessage, ChatRole, ContentPart, ToolCall, ToolDefinition,
};
use atrium_domain::{Error, Result};

use crate::client::{ChatClient, ChatCompletion, ChatRequest};
use crate::window;

/// Transient-failure retries (on top of the first attempt).
const MAX_RETRIES: u32 = 2;
const RETRY_BASE: Duration = Duration::from_millis(250);

pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            default_model: cfg.model.clone(),
            http,
        })
    }

    fn build_body(&self, req: &ChatRequest, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages.iter().map(msg_to_wire).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }

    async fn post_once(&self, body: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .http
            .post(&url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = builder
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport_error)?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::LlmUnavailable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            // 4xx other than 429: the request itself is bad; retrying is
            // pointless.
            return Err(Error::Internal(format!(
                "chat endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        serde_json::from_str(&text).map_err(Error::Json)
    }
}

fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout("llm request".into())
    } else {
        Error::LlmUnavailable(e.to_string())
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatCompletion> {
        // The window policy is enforced here so no caller can leak an
        // unbounded history to the endpoint.
        let messages = window::trim_window(&req.messages);
        let body = self.build_body(req, &messages);

        let mut attempt = 0u32;
        loop {
            match self.post_once(&body).await {
                Ok(json) => return parse_completion(&json),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = RETRY_BASE * 2u32.pow(attempt);
                    tracing::warn!(error = %e, attempt, "llm request failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn client_id(&self) -> &str {
        &self.id
    }
}

// ── Wire serialization ─────────────────────────────────────────────

fn role_to_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn msg_to_wire(msg: &ChatMessage) -> Value {
    match msg.role {
        ChatRole::Tool => tool_result_to_wire(msg),
        ChatRole::Assistant => assistant_to_wire(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_wire(msg: &ChatMessage) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        ChatContent::Text(t) => text_parts.push(t.clone()),
        ChatContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ContentPart::ToolResult { .. } => {}
                }
            }
        }
    }

    if text_parts.is_empty() {
        obj["content"] = Value::Null;
    } else {
        obj["content"] = Value::String(text_parts.join("\n"));
    }
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_wire(msg: &ChatMessage) -> Value {
    if let ChatContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult {
                tool_use_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ── Response parsing ───────────────────────────────────────────────

fn parse_completion(body: &Value) -> Result<ChatCompletion> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Internal("no choices in chat response".into()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| Error::Internal("no message in chat choice".into()))?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatCompletion {
        content,
        tool_calls: parse_tool_calls(message),
        model,
        finish_reason,
    })
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall {
                call_id,
                tool_name,
                arguments,
            })
        })
        .collect()
}
