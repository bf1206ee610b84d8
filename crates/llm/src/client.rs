//! Provider-agnostic request/response types and the client trait.

use std::collections::VecDeque;

use parking_lot::Mutex;

use atrium_domain::tool::{ChatMessage, ToolCall, ToolDefinition};
use atrium_domain::{Error, Result};

/// A chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send (window policy applies).
    pub messages: Vec<ChatMessage>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the endpoint choose.
    pub temperature: Option<f32>,
    /// Model override. When `None`, the client uses its configured default.
    pub model: Option<String>,
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    /// Textual content of the assistant message.
    pub content: String,
    /// Tool calls the model requested, in order.
    pub tool_calls: Vec<ToolCall>,
    /// The model that produced the response.
    pub model: String,
    /// Why the model stopped (e.g. "stop", "tool_calls").
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            model: "scripted".into(),
            finish_reason: Some("stop".into()),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls: calls,
            model: "scripted".into(),
            finish_reason: Some("tool_calls".into()),
        }
    }
}

/// Trait every chat-completion adapter implements.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Send one chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatCompletion>;

    /// A unique identifier for this client instance.
    fn client_id(&self) -> &str;
}

/// Test client that replays a scripted sequence of responses and records
/// every request it saw.
#[derive(Default)]
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<ChatCompletion>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new(responses: Vec<ChatCompletion>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests observed so far (cloned).
    pub fn seen_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().push(req.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::LlmUnavailable("scripted client exhausted".into()))
    }

    fn client_id(&self) -> &str {
        "scripted"
    }
}
