//! Chat-completion adapter.
//!
//! Translates the internal message/tool types to the chat-completions
//! wire format, enforces the message-window policy, and surfaces the
//! model's tool-call requests as structured records. The adapter never
//! mutates conversation state and never calls tools itself.

pub mod client;
pub mod openai_compat;
pub mod window;

pub use client::{ChatClient, ChatCompletion, ChatRequest, ScriptedChatClient};
pub use openai_compat::OpenAiCompatClient;
