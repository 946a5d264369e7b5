// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dialogue Engine
//!
//! Per-conversation slot-filling service. Each turn merges the oracle's
//! extracted fields into the session draft, recomputes the missing set, and
//! advances the session state machine; a completed draft is validated and
//! handed to the store lifecycle service.
//!
//! Utterances for one session are strictly serialized on the session's own
//! mutex; distinct sessions run fully in parallel.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::dialogue::{
    ConversationSession, Cta, DialogueContext, DialogueResponse, ExtractedIntent,
    IntentExtractionError, IntentExtractor, IntentKind, SessionId, SessionState,
};
use crate::domain::events::DialogueEvent;
use crate::domain::repository::RepositoryError;
use crate::domain::store::{DuplicatePolicy, StoreId, UserId};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::session_store::SessionStore;

use super::store_lifecycle::{CreateStoreError, StoreLifecycleService};

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error(transparent)]
    Extraction(#[from] IntentExtractionError),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

pub struct DialogueEngine {
    sessions: SessionStore,
    extractor: Arc<dyn IntentExtractor>,
    lifecycle: Arc<StoreLifecycleService>,
    event_bus: EventBus,
    share_link_base: String,
}

impl DialogueEngine {
    pub fn new(
        sessions: SessionStore,
        extractor: Arc<dyn IntentExtractor>,
        lifecycle: Arc<StoreLifecycleService>,
        event_bus: EventBus,
        share_link_base: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            extractor,
            lifecycle,
            event_bus,
            share_link_base: share_link_base.into(),
        }
    }

    /// Process one utterance for one session: check out the session (an
    /// idle-expired one is replaced by a fresh empty draft), ask the oracle
    /// for the structured intent, and apply it.
    pub async fn handle_message(
        &self,
        session_id: SessionId,
        user_id: UserId,
        utterance: &str,
    ) -> Result<DialogueResponse, DialogueError> {
        let now = Utc::now();
        let (session, abandoned) = self.sessions.checkout(&session_id, &user_id, now);
        if let Some(event) = abandoned {
            self.event_bus.publish_dialogue_event(event);
        }

        // Strict arrival-order processing per session id.
        let mut session = session.lock().await;

        let context = DialogueContext {
            state: session.state,
            missing_fields: session.draft.missing(),
        };
        let intent = self.extractor.extract(utterance, &context).await?;
        debug!(
            session_id = %session.id,
            intent = ?intent.intent,
            fields = intent.fields.len(),
            "utterance extracted"
        );

        self.apply_intent(&mut session, intent, now).await
    }

    /// Apply an already-extracted intent to a session. Public so the state
    /// machine can be driven without an oracle.
    pub async fn apply_intent(
        &self,
        session: &mut ConversationSession,
        intent: ExtractedIntent,
        now: DateTime<Utc>,
    ) -> Result<DialogueResponse, DialogueError> {
        session.touch(now);

        // A message after Done starts a fresh draft in the same session.
        if session.state == SessionState::Done {
            session.reset_draft(now);
        }

        if intent.intent == IntentKind::Cancel {
            session.state = SessionState::Abandoned;
            self.event_bus
                .publish_dialogue_event(DialogueEvent::SessionAbandoned {
                    session_id: session.id.clone(),
                    abandoned_at: now,
                });
            return Ok(DialogueResponse {
                prompt: "Okay, I've dropped that draft. Message me again whenever you want to \
                         add a store."
                    .to_string(),
                ctas: vec![],
                session_state: SessionState::Abandoned,
                missing_fields: vec![],
                store_id: None,
            });
        }

        session.draft.merge(&intent.fields);

        match session.state {
            SessionState::Confirming if intent.intent == IntentKind::ConfirmSubmission => {
                self.submit_draft(session, now).await
            }
            SessionState::Confirming => Ok(self.confirm_prompt(session)),
            _ => Ok(self.advance_collecting(session)),
        }
    }

    /// Recompute the missing set and either re-prompt (one message naming
    /// every missing field, fixed order) or move to Confirming.
    fn advance_collecting(&self, session: &mut ConversationSession) -> DialogueResponse {
        let missing = session.draft.missing();
        if missing.is_empty() {
            session.state = SessionState::Confirming;
            return self.confirm_prompt(session);
        }

        session.state = SessionState::Collecting;
        let wanted = missing
            .iter()
            .map(|slot| slot.prompt_label())
            .collect::<Vec<_>>()
            .join(", ");
        DialogueResponse {
            prompt: format!("Got it. I still need {}.", wanted),
            ctas: vec![],
            session_state: SessionState::Collecting,
            missing_fields: missing,
            store_id: None,
        }
    }

    fn confirm_prompt(&self, session: &ConversationSession) -> DialogueResponse {
        DialogueResponse {
            prompt: format!(
                "Here's what I have:\n{}\nShall I submit it?",
                session.draft.summary()
            ),
            ctas: vec![Cta::ConfirmSubmission],
            session_state: SessionState::Confirming,
            missing_fields: vec![],
            store_id: None,
        }
    }

    async fn submit_draft(
        &self,
        session: &mut ConversationSession,
        now: DateTime<Utc>,
    ) -> Result<DialogueResponse, DialogueError> {
        let Some(submission) = session.draft.to_submission() else {
            // Confirming with an incomplete draft cannot normally happen;
            // recover by re-prompting for whatever is missing.
            return Ok(self.advance_collecting(session));
        };

        session.state = SessionState::Submitting;
        // A confirm after the duplicate conflict was presented means
        // "create anyway".
        let policy = if session.duplicate_of.is_some() {
            DuplicatePolicy::CreateAnyway
        } else {
            DuplicatePolicy::Reject
        };

        match self
            .lifecycle
            .create(session.user_id.clone(), &submission, policy)
            .await
        {
            Ok(store) => {
                session.state = SessionState::Done;
                session.created_store = Some(store.id);
                info!(session_id = %session.id, store_id = %store.id, "dialogue draft submitted");
                self.event_bus
                    .publish_dialogue_event(DialogueEvent::DraftSubmitted {
                        session_id: session.id.clone(),
                        store_id: store.id,
                        submitted_at: now,
                    });
                let link = self.share_link(store.id);
                Ok(DialogueResponse {
                    prompt: format!(
                        "{} is listed! The community will confirm it soon. Share it: {}",
                        store.name, link
                    ),
                    ctas: vec![Cta::ExternalLink { url: link }],
                    session_state: SessionState::Done,
                    missing_fields: vec![],
                    store_id: Some(store.id),
                })
            }
            Err(CreateStoreError::Invalid(violations)) => {
                for violation in &violations {
                    session.draft.clear(violation.field);
                }
                session.state = SessionState::Collecting;
                session.duplicate_of = None;
                let issues = violations
                    .iter()
                    .map(|violation| violation.message.clone())
                    .collect::<Vec<_>>()
                    .join("; ");
                let missing = session.draft.missing();
                Ok(DialogueResponse {
                    prompt: format!("A few details need fixing: {}.", issues),
                    ctas: vec![],
                    session_state: SessionState::Collecting,
                    missing_fields: missing,
                    store_id: None,
                })
            }
            Err(CreateStoreError::Duplicate { existing_store_id }) => {
                session.state = SessionState::Confirming;
                session.duplicate_of = Some(existing_store_id);
                Ok(DialogueResponse {
                    prompt: "Looks like that store is already listed. Take a look, or confirm \
                             again to list yours anyway."
                        .to_string(),
                    ctas: vec![
                        Cta::Navigate {
                            target: format!("stores/{}", existing_store_id),
                        },
                        Cta::ConfirmSubmission,
                    ],
                    session_state: SessionState::Confirming,
                    missing_fields: vec![],
                    store_id: None,
                })
            }
            Err(CreateStoreError::Storage(err)) => {
                // Draft is intact; the user can confirm again.
                session.state = SessionState::Confirming;
                Err(DialogueError::Storage(err))
            }
        }
    }

    fn share_link(&self, store_id: StoreId) -> String {
        format!("{}/{}", self.share_link_base.trim_end_matches('/'), store_id)
    }

    /// Garbage-collect idle sessions, publishing an abandonment event per
    /// mid-conversation session dropped.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let events = self.sessions.sweep_idle(now);
        let count = events.len();
        for event in events {
            self.event_bus.publish_dialogue_event(event);
        }
        count
    }
}
