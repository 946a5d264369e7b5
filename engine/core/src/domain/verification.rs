// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Verification Domain
//!
//! Types for the quorum-based crowd-verification of store listings: the
//! per-voter vote record, the atomic confirm outcome reported by the
//! repository layer, and the error taxonomy.
//!
//! ## Invariants
//!
//! - At most one persisted Confirm record per `(store_id, voter_id)`.
//! - The creator of a store can never hold a Confirm record for it.
//! - `Ignore` decisions never touch `verify_count`; they only populate the
//!   per-user suppression set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::RepositoryError;
use crate::domain::store::{StoreId, StoreStatus, UserId};

/// Unique identifier for a verification vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationId(pub Uuid);

impl VerificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voter's decision on a pending store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// "I have seen this store" — counts toward the quorum.
    Confirm,
    /// "Stop showing me this" — suppression only, never counted.
    Ignore,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Confirm => "confirm",
            Decision::Ignore => "ignore",
        }
    }
}

/// One voter's persisted decision on one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub store_id: StoreId,
    pub voter_id: UserId,
    pub decision: Decision,
    /// Optional proof URL or free-text reason.
    pub evidence: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl VerificationRequest {
    pub fn confirm(store_id: StoreId, voter_id: UserId, evidence: Option<String>) -> Self {
        Self {
            id: VerificationId::new(),
            store_id,
            voter_id,
            decision: Decision::Confirm,
            evidence,
            submitted_at: Utc::now(),
        }
    }

    pub fn ignore(store_id: StoreId, voter_id: UserId) -> Self {
        Self {
            id: VerificationId::new(),
            store_id,
            voter_id,
            decision: Decision::Ignore,
            evidence: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Outcome of the repository's atomic confirm operation.
///
/// The vote insert, the `verify_count` increment, the threshold comparison,
/// and the status flip all happen inside one critical section / transaction;
/// this enum reports which branch was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmResult {
    /// A genuinely new confirmation was recorded. `newly_verified` is true
    /// on exactly the vote whose increment first reached the quorum.
    Applied {
        verify_count: u32,
        status: StoreStatus,
        newly_verified: bool,
    },
    /// This voter already holds a Confirm for the store; nothing changed.
    Duplicate {
        verify_count: u32,
        status: StoreStatus,
    },
    /// The store was already `Verified` or `Archived` before this vote.
    AlreadyClosed {
        verify_count: u32,
        status: StoreStatus,
    },
}

/// Caller-facing outcome of `submit_verification`. Stale-state cases are
/// successes (safe to retry), not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Applied {
        status: StoreStatus,
        verify_count: u32,
        newly_verified: bool,
    },
    DuplicateConfirm {
        status: StoreStatus,
        verify_count: u32,
    },
    AlreadyVerified {
        verify_count: u32,
    },
    AlreadyArchived,
    IgnoreRecorded {
        status: StoreStatus,
    },
}

impl VerificationOutcome {
    pub fn status(&self) -> StoreStatus {
        match self {
            VerificationOutcome::Applied { status, .. } => *status,
            VerificationOutcome::DuplicateConfirm { status, .. } => *status,
            VerificationOutcome::AlreadyVerified { .. } => StoreStatus::Verified,
            VerificationOutcome::AlreadyArchived => StoreStatus::Archived,
            VerificationOutcome::IgnoreRecorded { status } => *status,
        }
    }

    pub fn verify_count(&self) -> Option<u32> {
        match self {
            VerificationOutcome::Applied { verify_count, .. } => Some(*verify_count),
            VerificationOutcome::DuplicateConfirm { verify_count, .. } => Some(*verify_count),
            VerificationOutcome::AlreadyVerified { verify_count } => Some(*verify_count),
            VerificationOutcome::AlreadyArchived => None,
            VerificationOutcome::IgnoreRecorded { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("store not found: {0}")]
    NotFound(StoreId),

    /// Policy violation, rejected unconditionally.
    #[error("a store cannot be verified by its creator")]
    SelfVerificationForbidden,

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}
