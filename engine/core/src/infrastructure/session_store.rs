// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dialogue Session Cache
//!
//! TTL-bounded in-process store for [`ConversationSession`]s. Sessions are
//! deliberately not durable: losing one on restart only costs the user a
//! partially-filled draft, and the dialogue protocol restarts clean.
//!
//! ## Concurrency
//!
//! - Each session lives behind its own `tokio::sync::Mutex`, giving the
//!   strict single-writer ordering the slot merge requires. Distinct
//!   sessions share nothing and run fully in parallel.
//! - Idle expiry is passive: it is checked when a session is next touched
//!   (or during a `sweep_idle` pass); no cancellation signal is ever sent
//!   into in-flight work. A session whose mutex is currently held is by
//!   definition not idle.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::dialogue::{ConversationSession, SessionId, SessionState};
use crate::domain::events::DialogueEvent;

pub type SharedSession = Arc<Mutex<ConversationSession>>;

pub struct SessionStore {
    sessions: DashMap<SessionId, SharedSession>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: std::time::Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout: Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| Duration::minutes(15)),
        }
    }

    /// Fetch the session for `id`, creating a fresh one if none exists or
    /// the existing one is abandoned/idle-expired. Returns the abandonment
    /// event when an expired session was replaced.
    ///
    /// The map shard lock serializes concurrent checkouts of the same id,
    /// so two racing first messages cannot create two sessions.
    pub fn checkout(
        &self,
        id: &SessionId,
        user: &crate::domain::store::UserId,
        now: DateTime<Utc>,
    ) -> (SharedSession, Option<DialogueEvent>) {
        let mut abandoned = None;

        let mut entry = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationSession::new(
                    id.clone(),
                    user.clone(),
                    now,
                )))
            });

        let current = entry.value().clone();

        // A held mutex means an in-flight turn: recent activity, not idle.
        if let Ok(mut session) = current.try_lock() {
            let expired = session.is_idle_expired(self.idle_timeout, now);
            if expired || session.state == SessionState::Abandoned {
                if session.state != SessionState::Abandoned {
                    session.state = SessionState::Abandoned;
                    abandoned = Some(DialogueEvent::SessionAbandoned {
                        session_id: session.id.clone(),
                        abandoned_at: now,
                    });
                    debug!(session_id = %session.id, "dialogue session idle-expired");
                }
                drop(session);
                let fresh: SharedSession = Arc::new(Mutex::new(ConversationSession::new(
                    id.clone(),
                    user.clone(),
                    now,
                )));
                *entry.value_mut() = fresh.clone();
                return (fresh, abandoned);
            }
        }

        (current, abandoned)
    }

    /// Garbage-collect idle sessions. Returns an abandonment event per
    /// session that was dropped while still mid-conversation.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<DialogueEvent> {
        let mut events = Vec::new();
        self.sessions.retain(|_, session| {
            // Busy sessions are in-flight and therefore not idle.
            let Ok(session) = session.try_lock() else {
                return true;
            };
            if !session.is_idle_expired(self.idle_timeout, now) {
                return true;
            }
            if session.state != SessionState::Done && session.state != SessionState::Abandoned {
                events.push(DialogueEvent::SessionAbandoned {
                    session_id: session.id.clone(),
                    abandoned_at: now,
                });
            }
            false
        });
        events
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
