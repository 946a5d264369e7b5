// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::dialogue::SessionId;
use crate::domain::store::{StoreId, UserId};
use crate::domain::verification::Decision;

/// Store lifecycle and verification events.
///
/// `StoreVerified` is the hook for the external notification dispatcher; it
/// is emitted exactly once per store, atomically with the quorum-reaching
/// count update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreEvent {
    StoreCreated {
        store_id: StoreId,
        name: String,
        created_by: UserId,
        created_at: DateTime<Utc>,
    },
    StoreVerified {
        store_id: StoreId,
        verify_count: u32,
        verified_at: DateTime<Utc>,
    },
    StoreArchived {
        store_id: StoreId,
        moderator_id: UserId,
        reason: String,
        archived_at: DateTime<Utc>,
    },
    VerificationRecorded {
        store_id: StoreId,
        voter_id: UserId,
        decision: Decision,
        verify_count: u32,
        recorded_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DialogueEvent {
    SessionAbandoned {
        session_id: SessionId,
        abandoned_at: DateTime<Utc>,
    },
    DraftSubmitted {
        session_id: SessionId,
        store_id: StoreId,
        submitted_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── StoreEvent serialization ──────────────────────────────────────────────

    #[test]
    fn test_store_verified_serialization() {
        let store_id = StoreId::new();
        let event = StoreEvent::StoreVerified {
            store_id,
            verify_count: 3,
            verified_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: StoreEvent = serde_json::from_str(&json).unwrap();
        if let StoreEvent::StoreVerified { store_id: id, verify_count, .. } = deserialized {
            assert_eq!(id, store_id);
            assert_eq!(verify_count, 3);
        } else {
            panic!("unexpected variant");
        }
    }

    #[test]
    fn test_verification_recorded_serialization() {
        let event = StoreEvent::VerificationRecorded {
            store_id: StoreId::new(),
            voter_id: UserId::new("voter-1"),
            decision: Decision::Confirm,
            verify_count: 1,
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("VerificationRecorded"));
        assert!(json.contains("confirm"));
    }

    // ── DialogueEvent serialization ───────────────────────────────────────────

    #[test]
    fn test_session_abandoned_serialization() {
        let event = DialogueEvent::SessionAbandoned {
            session_id: SessionId::new("chat-42"),
            abandoned_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: DialogueEvent = serde_json::from_str(&json).unwrap();
        if let DialogueEvent::SessionAbandoned { session_id, .. } = deserialized {
            assert_eq!(session_id, SessionId::new("chat-42"));
        } else {
            panic!("unexpected variant");
        }
    }
}
