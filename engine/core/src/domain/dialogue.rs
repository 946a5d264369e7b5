// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dialogue Session Aggregate
//!
//! Domain model for the slot-filling conversation that turns free-form chat
//! into a validated store submission.
//!
//! ## Session Lifecycle
//!
//! ```text
//! Collecting ──[all slots filled + add_store intent]──► Confirming
//! Confirming ──[confirm_submission intent]───────────► Submitting
//! Submitting ──[validator + lifecycle ok]────────────► Done
//! Submitting ──[validation failure]──────────────────► Collecting
//! any ───────[idle timeout / cancel]─────────────────► Abandoned
//! ```
//!
//! ## Invariants
//!
//! - Utterances for one session are processed strictly in arrival order
//!   (slot merge is last-write-wins per field, so ordering matters); the
//!   session store enforces a single writer per session id.
//! - An `Abandoned` session is never resumed: the next utterance for that
//!   session id starts a brand-new session with empty slots.
//! - The engine never performs its own NLP: structured intent arrives from
//!   the external [`IntentExtractor`] oracle.
//!
//! ## Anti-Corruption Layer
//!
//! [`IntentExtractor`] is a domain trait abstracting the external NLU/LLM
//! oracle. The HTTP implementation lives in
//! [`crate::infrastructure::intent_client`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::store::{StoreId, UserId};
use crate::domain::submission::StoreSubmission;

// ============================================================================
// Value Objects: Identifiers & Slots
// ============================================================================

/// Caller-chosen identifier for one conversation (from the dialogue URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The six required submission fields, in the fixed order used for
/// prompting. A single prompt enumerates every missing field so the user
/// can fill several slots in one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Name,
    Phone,
    Location,
    OpensAt,
    ClosesAt,
    Description,
}

impl SlotName {
    /// Fixed prompting order.
    pub const ALL: [SlotName; 6] = [
        SlotName::Name,
        SlotName::Phone,
        SlotName::Location,
        SlotName::OpensAt,
        SlotName::ClosesAt,
        SlotName::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::Name => "name",
            SlotName::Phone => "phone",
            SlotName::Location => "location",
            SlotName::OpensAt => "opens_at",
            SlotName::ClosesAt => "closes_at",
            SlotName::Description => "description",
        }
    }

    /// Boundary parse for oracle field names; unknown names yield `None`
    /// and are dropped rather than failing the turn.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(SlotName::Name),
            "phone" => Some(SlotName::Phone),
            "location" => Some(SlotName::Location),
            "opens_at" => Some(SlotName::OpensAt),
            "closes_at" => Some(SlotName::ClosesAt),
            "description" => Some(SlotName::Description),
            _ => None,
        }
    }

    /// Human wording used when enumerating missing fields in a prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            SlotName::Name => "the store name",
            SlotName::Phone => "a contact phone number",
            SlotName::Location => "where it is",
            SlotName::OpensAt => "its opening time",
            SlotName::ClosesAt => "its closing time",
            SlotName::Description => "a short description",
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partially-filled submission accumulated across turns. Unset entries are
/// absent; merging is last-write-wins per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDraft {
    name: Option<String>,
    phone: Option<String>,
    location: Option<String>,
    opens_at: Option<String>,
    closes_at: Option<String>,
    description: Option<String>,
}

impl StoreDraft {
    fn slot_mut(&mut self, slot: SlotName) -> &mut Option<String> {
        match slot {
            SlotName::Name => &mut self.name,
            SlotName::Phone => &mut self.phone,
            SlotName::Location => &mut self.location,
            SlotName::OpensAt => &mut self.opens_at,
            SlotName::ClosesAt => &mut self.closes_at,
            SlotName::Description => &mut self.description,
        }
    }

    pub fn get(&self, slot: SlotName) -> Option<&str> {
        match slot {
            SlotName::Name => self.name.as_deref(),
            SlotName::Phone => self.phone.as_deref(),
            SlotName::Location => self.location.as_deref(),
            SlotName::OpensAt => self.opens_at.as_deref(),
            SlotName::ClosesAt => self.closes_at.as_deref(),
            SlotName::Description => self.description.as_deref(),
        }
    }

    /// Set a slot. Empty or whitespace-only values are ignored rather than
    /// clearing an already-filled slot.
    pub fn set(&mut self, slot: SlotName, value: impl Into<String>) {
        let value = value.into();
        if !value.trim().is_empty() {
            *self.slot_mut(slot) = Some(value);
        }
    }

    pub fn clear(&mut self, slot: SlotName) {
        *self.slot_mut(slot) = None;
    }

    /// Merge extracted fields into the draft, last-write-wins per field.
    pub fn merge(&mut self, fields: &HashMap<SlotName, String>) {
        for slot in SlotName::ALL {
            if let Some(value) = fields.get(&slot) {
                self.set(slot, value.clone());
            }
        }
    }

    /// Still-missing required fields, in fixed prompting order.
    pub fn missing(&self) -> Vec<SlotName> {
        SlotName::ALL
            .into_iter()
            .filter(|slot| self.get(*slot).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Build the submission payload. `None` until every slot is filled.
    pub fn to_submission(&self) -> Option<StoreSubmission> {
        Some(StoreSubmission {
            name: self.name.clone()?,
            phone: self.phone.clone()?,
            location: self.location.clone()?,
            opens_at: self.opens_at.clone()?,
            closes_at: self.closes_at.clone()?,
            description: self.description.clone()?,
            photo_ref: None,
        })
    }

    /// Draft recap shown when asking the user to confirm.
    pub fn summary(&self) -> String {
        SlotName::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|v| format!("{}: {}", slot.as_str(), v)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Entities: Conversation Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Collecting,
    Confirming,
    Submitting,
    Done,
    Abandoned,
}

/// One user's in-flight onboarding conversation. Owned exclusively by the
/// dialogue engine and held in a TTL-bounded cache, never durable storage.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub draft: StoreDraft,
    pub state: SessionState,
    pub last_activity_at: DateTime<Utc>,
    /// Set after a duplicate conflict was presented; the next confirm then
    /// means "create anyway".
    pub duplicate_of: Option<StoreId>,
    pub created_store: Option<StoreId>,
}

impl ConversationSession {
    pub fn new(id: SessionId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            draft: StoreDraft::default(),
            state: SessionState::Collecting,
            last_activity_at: now,
            duplicate_of: None,
            created_store: None,
        }
    }

    /// Passive idle-expiry check; no cancellation signal is ever sent into
    /// in-flight work.
    pub fn is_idle_expired(&self, idle_timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at >= idle_timeout
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Start a fresh collection round in place (after `Done`).
    pub fn reset_draft(&mut self, now: DateTime<Utc>) {
        self.draft = StoreDraft::default();
        self.state = SessionState::Collecting;
        self.duplicate_of = None;
        self.created_store = None;
        self.last_activity_at = now;
    }
}

// ============================================================================
// Value Objects: Intents & Responses
// ============================================================================

/// Closed set of intents the engine reacts to. Anything else the oracle
/// produces is mapped to `Unknown` at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    AddStore,
    ConfirmSubmission,
    Cancel,
    Unknown,
}

impl IntentKind {
    /// Boundary parse for oracle responses; unrecognized tags degrade to
    /// `Unknown` instead of failing the turn.
    pub fn parse(s: &str) -> Self {
        match s {
            "add_store" => IntentKind::AddStore,
            "confirm_submission" => IntentKind::ConfirmSubmission,
            "cancel" => IntentKind::Cancel,
            _ => IntentKind::Unknown,
        }
    }
}

/// Structured intent produced by the external NLU oracle for one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIntent {
    pub intent: IntentKind,
    #[serde(default)]
    pub fields: HashMap<SlotName, String>,
    #[serde(default)]
    pub confidence: f64,
}

impl ExtractedIntent {
    pub fn unknown() -> Self {
        Self {
            intent: IntentKind::Unknown,
            fields: HashMap::new(),
            confidence: 0.0,
        }
    }
}

/// Call-to-action rendered as a button by the front end. Closed, tagged
/// variant validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cta {
    ConfirmSubmission,
    Navigate { target: String },
    ExternalLink { url: String },
}

/// What the engine hands back to the chat front end after each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueResponse {
    pub prompt: String,
    pub ctas: Vec<Cta>,
    pub session_state: SessionState,
    pub missing_fields: Vec<SlotName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreId>,
}

/// Conversation context passed to the oracle so extraction can be primed
/// with what the engine is currently asking for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueContext {
    pub state: SessionState,
    pub missing_fields: Vec<SlotName>,
}

#[derive(Debug, thiserror::Error)]
pub enum IntentExtractionError {
    #[error("intent oracle unavailable: {0}")]
    Unavailable(String),

    #[error("intent oracle request failed: {0}")]
    Request(String),

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// External NLU/LLM oracle turning an utterance into a structured intent.
/// The dialogue engine never performs its own NLP.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(
        &self,
        message: &str,
        context: &DialogueContext,
    ) -> Result<ExtractedIntent, IntentExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fixed_order() {
        let mut draft = StoreDraft::default();
        draft.set(SlotName::Location, "13 Moria Rd");
        draft.set(SlotName::Name, "Iya Moria");

        assert_eq!(
            draft.missing(),
            vec![
                SlotName::Phone,
                SlotName::OpensAt,
                SlotName::ClosesAt,
                SlotName::Description,
            ]
        );
    }

    #[test]
    fn test_merge_is_last_write_wins_per_field() {
        let mut draft = StoreDraft::default();
        let mut first = HashMap::new();
        first.insert(SlotName::Name, "Iya Moira".to_string());
        draft.merge(&first);

        let mut second = HashMap::new();
        second.insert(SlotName::Name, "Iya Moria".to_string());
        second.insert(SlotName::Phone, "+2348110453053".to_string());
        draft.merge(&second);

        assert_eq!(draft.get(SlotName::Name), Some("Iya Moria"));
        assert_eq!(draft.get(SlotName::Phone), Some("+2348110453053"));
    }

    #[test]
    fn test_empty_extracted_value_never_clears_a_slot() {
        let mut draft = StoreDraft::default();
        draft.set(SlotName::Name, "Iya Moria");

        let mut fields = HashMap::new();
        fields.insert(SlotName::Name, "   ".to_string());
        draft.merge(&fields);

        assert_eq!(draft.get(SlotName::Name), Some("Iya Moria"));
    }

    #[test]
    fn test_to_submission_requires_completeness() {
        let mut draft = StoreDraft::default();
        assert!(draft.to_submission().is_none());

        draft.set(SlotName::Name, "Iya Moria");
        draft.set(SlotName::Phone, "+2348110453053");
        draft.set(SlotName::Location, "13 Moria Rd");
        draft.set(SlotName::OpensAt, "08:30");
        draft.set(SlotName::ClosesAt, "21:00");
        draft.set(SlotName::Description, "Great amala spot");

        let submission = draft.to_submission().unwrap();
        assert_eq!(submission.name, "Iya Moria");
        assert!(draft.is_complete());
    }

    #[test]
    fn test_idle_expiry() {
        let now = Utc::now();
        let session =
            ConversationSession::new(SessionId::new("s-1"), UserId::new("u-1"), now);

        assert!(!session.is_idle_expired(Duration::minutes(15), now + Duration::minutes(14)));
        assert!(session.is_idle_expired(Duration::minutes(15), now + Duration::minutes(15)));
    }

    #[test]
    fn test_intent_parse_degrades_to_unknown() {
        assert_eq!(IntentKind::parse("add_store"), IntentKind::AddStore);
        assert_eq!(IntentKind::parse("confirm_submission"), IntentKind::ConfirmSubmission);
        assert_eq!(IntentKind::parse("order_pizza"), IntentKind::Unknown);
    }

    #[test]
    fn test_cta_serializes_tagged() {
        let cta = Cta::ExternalLink {
            url: "https://buka.example/stores/abc".to_string(),
        };
        let json = serde_json::to_string(&cta).unwrap();
        assert!(json.contains(r#""type":"external_link""#));
    }
}
