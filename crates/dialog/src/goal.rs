//! Active-goal records and the per-conversation goal store.
//!
//! At most one goal per conversation; the record is deleted on
//! confirmation, cancellation, or expiry. A store outage degrades to "no
//! active goal" and the conversation continues statelessly.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::extract::ExtractedDateTime;

/// The goal kinds the classifier can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    ScheduleCall,
    BookMeeting,
    SendEmail,
    CreateReminder,
}

impl GoalType {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalType::ScheduleCall => "schedule_call",
            GoalType::BookMeeting => "book_meeting",
            GoalType::SendEmail => "send_email",
            GoalType::CreateReminder => "create_reminder",
        }
    }

    /// The bare noun for prompts ("who is the call with?").
    pub fn noun(self) -> &'static str {
        match self {
            GoalType::ScheduleCall => "call",
            GoalType::BookMeeting => "meeting",
            GoalType::SendEmail => "email",
            GoalType::CreateReminder => "reminder",
        }
    }

    /// Human phrasing used in confirmation and status messages.
    pub fn describe(self) -> &'static str {
        match self {
            GoalType::ScheduleCall => "schedule a call",
            GoalType::BookMeeting => "book a meeting",
            GoalType::SendEmail => "send an email",
            GoalType::CreateReminder => "create a reminder",
        }
    }

    /// Whether this goal needs a lead/contact slot before confirmation.
    pub fn requires_lead(self) -> bool {
        matches!(
            self,
            GoalType::ScheduleCall | GoalType::BookMeeting | GoalType::SendEmail
        )
    }

    /// Whether this goal needs a date/time slot before confirmation.
    pub fn requires_date_time(self) -> bool {
        !matches!(self, GoalType::SendEmail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    AwaitingInput,
    PendingConfirmation,
}

/// Slots extracted from the user's utterances so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    pub raw_text: String,
    #[serde(default)]
    pub lead: Option<String>,
    #[serde(default)]
    pub date_time: Option<ExtractedDateTime>,
    /// Anything else a goal action wants to carry across turns.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: Uuid,
    pub goal_type: GoalType,
    pub conversation_id: String,
    pub tenant_id: Uuid,
    pub extracted: ExtractedData,
    pub status: GoalStatus,
    pub confirmation_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(
        goal_type: GoalType,
        conversation_id: impl Into<String>,
        tenant_id: Uuid,
        raw_text: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            goal_id: Uuid::new_v4(),
            goal_type,
            conversation_id: conversation_id.into(),
            tenant_id,
            extracted: ExtractedData {
                raw_text: raw_text.into(),
                ..Default::default()
            },
            status: GoalStatus::AwaitingInput,
            confirmation_message: String::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The slots still missing before the goal can be confirmed.
    pub fn missing_slots(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.goal_type.requires_lead() && self.extracted.lead.is_none() {
            missing.push("lead");
        }
        if self.goal_type.requires_date_time() && self.extracted.date_time.is_none() {
            missing.push("date_time");
        }
        missing
    }
}

/// Per-conversation active-goal store. Upserts are last-writer-wins and
/// reads lazily expire.
#[derive(Default)]
pub struct GoalStore {
    goals: RwLock<HashMap<String, Goal>>,
}

impl GoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the conversation's active goal.
    pub fn set_active_goal(&self, goal: Goal) {
        self.goals
            .write()
            .insert(goal.conversation_id.clone(), goal);
    }

    /// The active goal, or `None` when absent or past its expiry.
    pub fn get_active_goal(&self, conversation_id: &str) -> Option<Goal> {
        let now = Utc::now();
        {
            let goals = self.goals.read();
            match goals.get(conversation_id) {
                Some(g) if !g.is_expired(now) => return Some(g.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop the record so the next write starts clean.
        self.goals.write().remove(conversation_id);
        None
    }

    pub fn clear_active_goal(&self, conversation_id: &str) {
        self.goals.write().remove(conversation_id);
    }

    pub fn len(&self) -> usize {
        self.goals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.read().is_empty()
    }
}
