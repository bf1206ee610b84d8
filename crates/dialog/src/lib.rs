//! Multi-turn dialog state: goals, conversation history, and the pure
//! classification functions the chat router is built on.
//!
//! Everything in [`intent`] and [`extract`] is deterministic and
//! side-effect free; the stores in [`goal`] and [`conversation`] are
//! process-scoped and constructed at boot.

pub mod conversation;
pub mod extract;
pub mod goal;
pub mod intent;

pub use conversation::{ConversationMessage, ConversationStore, MessageRole};
pub use extract::{extract_date_time, extract_lead_name, ExtractedDateTime};
pub use goal::{Goal, GoalStatus, GoalStore, GoalType};
pub use intent::{classify_response, detect_intent, DetectedIntent, ResponseType};
