//! Goal intent detection and response classification.
//!
//! Deterministic pattern matching over curated phrase libraries. The
//! detector is deliberately conservative: greetings, data questions, and
//! ambiguous inputs never start a goal - the stateless LLM path handles
//! those better than a wrongly-latched state machine would.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract;
use crate::goal::GoalType;

/// Outcome of [`detect_intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedIntent {
    pub detected: bool,
    pub goal_type: Option<GoalType>,
}

impl DetectedIntent {
    const NONE: Self = Self {
        detected: false,
        goal_type: None,
    };

    fn of(goal_type: GoalType) -> Self {
        Self {
            detected: true,
            goal_type: Some(goal_type),
        }
    }
}

/// Classification of a user message while a goal is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Confirm,
    Cancel,
    Reschedule,
    ProvideInfo,
    Unclear,
}

// ── Intent detection ───────────────────────────────────────────────

/// Detect a goal-starting intent in a user utterance.
pub fn detect_intent(text: &str) -> DetectedIntent {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() || is_question(&lower) {
        return DetectedIntent::NONE;
    }

    if reminder_re().is_match(&lower) {
        return DetectedIntent::of(GoalType::CreateReminder);
    }
    if email_re().is_match(&lower) {
        return DetectedIntent::of(GoalType::SendEmail);
    }
    if meeting_re().is_match(&lower) {
        return DetectedIntent::of(GoalType::BookMeeting);
    }
    if call_re().is_match(&lower) {
        return DetectedIntent::of(GoalType::ScheduleCall);
    }

    DetectedIntent::NONE
}

/// Data questions and lookups must stay on the stateless path even when
/// they mention calls or meetings.
fn is_question(lower: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^(what|when|who|where|why|how|which|did|do|does|is|are|was|were|show|list|find|search|tell)\b",
        )
        .expect("valid regex")
    });
    re.is_match(lower) || lower.ends_with('?')
}

// ── Response classification ────────────────────────────────────────

const CONFIRM_TOKENS: [&str; 14] = [
    "yes", "y", "yeah", "yep", "yup", "ok", "okay", "sure", "confirm", "confirmed", "proceed",
    "go ahead", "do it", "sounds good",
];

const CANCEL_TOKENS: [&str; 10] = [
    "no", "nope", "cancel", "stop", "nevermind", "never mind", "forget it", "abort", "don't",
    "not now",
];

/// Classify the user's reply to an active goal.
pub fn classify_response(text: &str) -> ResponseType {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return ResponseType::Unclear;
    }

    if CONFIRM_TOKENS.contains(&normalized.as_str()) {
        return ResponseType::Confirm;
    }
    if CANCEL_TOKENS.contains(&normalized.as_str()) {
        return ResponseType::Cancel;
    }

    if reschedule_re().is_match(&normalized) {
        return ResponseType::Reschedule;
    }

    // "yes please" / "no, cancel it": the leading word decides.
    let first_word = normalized
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_end_matches([',', '.', '!', '?']);
    if CONFIRM_TOKENS.contains(&first_word) {
        return ResponseType::Confirm;
    }
    if CANCEL_TOKENS.contains(&first_word) {
        return ResponseType::Cancel;
    }

    // Anything carrying a date/time or a plausible name fills slots.
    let probe_now = chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
        .expect("valid probe date")
        .and_hms_opt(0, 0, 0)
        .expect("valid probe time");
    if extract::extract_date_time(probe_now, text).is_some() {
        return ResponseType::ProvideInfo;
    }
    if extract::extract_lead_name(text).is_some() || proper_name_re().is_match(text) {
        return ResponseType::ProvideInfo;
    }

    ResponseType::Unclear
}

/// Lowercase, trim, and strip trailing punctuation so "Yes!" and "yes"
/// classify identically.
fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_lowercase()
}

// ── Compiled phrase libraries ──────────────────────────────────────

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(schedule|set up|setup|book|arrange|plan)\b.{0,40}\bcall\b|\bcall\b.{0,30}\bwith\b",
        )
        .expect("valid regex")
    })
}

fn meeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(book|schedule|set up|setup|arrange|plan)\b.{0,40}\bmeeting\b")
            .expect("valid regex")
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(send|write|draft|compose)\b.{0,40}\bemail\b|\bemail\b.{0,30}\bto\b")
            .expect("valid regex")
    })
}

fn reminder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bremind me\b|\b(create|set|add)\b.{0,20}\breminder\b").expect("valid regex")
    })
}

fn reschedule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\breschedule\b|\bchange the time\b|\bmove (it|the)\b|\b(different|another) time\b")
            .expect("valid regex")
    })
}

fn proper_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Two capitalized words mid-sentence, e.g. "John Smith".
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b").expect("valid regex"))
}
