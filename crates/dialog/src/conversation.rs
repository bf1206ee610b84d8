//! Per-conversation message log.
//!
//! Keeps the recent history the router feeds into the LLM window. Large
//! tool results are never stored inline - the executor replaces them with
//! an artifact reference before the message is appended.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use atrium_domain::tool::ToolCall;

/// Retained messages per conversation; older entries are dropped.
const MAX_RETAINED: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Artifact id standing in for an offloaded tool result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_ref: Option<String>,
    pub ts: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::of(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::of(MessageRole::Assistant, content)
    }

    pub fn tool(content: impl Into<String>, call: ToolCall, result_ref: Option<String>) -> Self {
        Self {
            tool_call: Some(call),
            tool_result_ref: result_ref,
            ..Self::of(MessageRole::Tool, content)
        }
    }

    fn of(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
            tool_result_ref: None,
            ts: Utc::now(),
        }
    }
}

/// Process-scoped conversation log.
#[derive(Default)]
pub struct ConversationStore {
    messages: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, conversation_id: &str, message: ConversationMessage) {
        let mut map = self.messages.write();
        let log = map.entry(conversation_id.to_string()).or_default();
        log.push(message);
        if log.len() > MAX_RETAINED {
            let excess = log.len() - MAX_RETAINED;
            log.drain(..excess);
        }
    }

    /// The most recent `n` messages, oldest first.
    pub fn tail(&self, conversation_id: &str, n: usize) -> Vec<ConversationMessage> {
        let map = self.messages.read();
        match map.get(conversation_id) {
            Some(log) => {
                let skip = log.len().saturating_sub(n);
                log[skip..].to_vec()
            }
            None => Vec::new(),
        }
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.messages
            .read()
            .get(conversation_id)
            .map_or(0, |l| l.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_tail_preserve_order() {
        let store = ConversationStore::new();
        store.append("c1", ConversationMessage::user("one"));
        store.append("c1", ConversationMessage::assistant("two"));
        store.append("c1", ConversationMessage::user("three"));

        let tail = store.tail("c1", 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "two");
        assert_eq!(tail[1].content, "three");
    }

    #[test]
    fn conversations_are_isolated() {
        let store = ConversationStore::new();
        store.append("c1", ConversationMessage::user("for c1"));
        assert!(store.tail("c2", 10).is_empty());
    }

    #[test]
    fn retention_drops_oldest() {
        let store = ConversationStore::new();
        for i in 0..150 {
            store.append("c1", ConversationMessage::user(format!("m{i}")));
        }
        assert_eq!(store.len("c1"), 100);
        assert_eq!(store.tail("c1", 1)[0].content, "m149");
        let oldest = store.tail("c1", 100);
        assert_eq!(oldest[0].content, "m50");
    }

    #[test]
    fn tool_message_carries_ref() {
        let store = ConversationStore::new();
        let call = ToolCall {
            call_id: "tc_1".into(),
            tool_name: "list_leads".into(),
            arguments: serde_json::json!({}),
        };
        store.append(
            "c1",
            ConversationMessage::tool("[offloaded]", call, Some("artifact-9".into())),
        );
        let tail = store.tail("c1", 1);
        assert_eq!(tail[0].tool_result_ref.as_deref(), Some("artifact-9"));
        assert_eq!(tail[0].tool_call.as_ref().unwrap().tool_name, "list_leads");
    }
}
