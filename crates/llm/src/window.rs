//! Message-window policy.
//!
//! Bounds what the model ever sees: at most 8 messages, 1500 chars of
//! content per message, 1200 chars per inlined tool-result summary.
//! The policy lives next to the adapter so a future window change stays
//! local to this crate.

use atrium_domain::tool::{ChatContent, ChatMessage, ChatRole, ContentPart};

pub const MAX_MESSAGES: usize = 8;
pub const MAX_CONTENT_CHARS: usize = 1500;
pub const MAX_TOOL_SUMMARY_CHARS: usize = 1200;

/// Trim a message list to policy. The leading system message (when
/// present) is retained and counts against the window.
pub fn trim_window(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = Vec::with_capacity(MAX_MESSAGES);

    let system = messages.first().filter(|m| m.role == ChatRole::System);
    let rest = if system.is_some() {
        &messages[1..]
    } else {
        messages
    };

    let budget = if system.is_some() {
        MAX_MESSAGES - 1
    } else {
        MAX_MESSAGES
    };
    let skip = rest.len().saturating_sub(budget);

    if let Some(sys) = system {
        out.push(truncate_message(sys));
    }
    for msg in &rest[skip..] {
        out.push(truncate_message(msg));
    }
    out
}

fn truncate_message(msg: &ChatMessage) -> ChatMessage {
    let content = match &msg.content {
        ChatContent::Text(t) => ChatContent::Text(truncate_str(t, MAX_CONTENT_CHARS)),
        ChatContent::Parts(parts) => ChatContent::Parts(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => ContentPart::Text {
                        text: truncate_str(text, MAX_CONTENT_CHARS),
                    },
                    ContentPart::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => ContentPart::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: truncate_str(content, MAX_TOOL_SUMMARY_CHARS),
                        is_error: *is_error,
                    },
                    other => other.clone(),
                })
                .collect(),
        ),
    };
    ChatMessage {
        role: msg.role,
        content,
    }
}

/// Char-boundary-safe truncation with an ellipsis marker.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
