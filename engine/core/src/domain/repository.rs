// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root, following the DDD
//! Repository pattern: interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `StoreRepository` | `Store` | `InMemoryDirectory`, `PostgresStoreRepository` |
//! | `VerificationRepository` | `VerificationRequest` + suppression set | `InMemoryDirectory`, `PostgresVerificationRepository` |
//!
//! ## The atomic confirm contract
//!
//! `VerificationRepository::apply_confirm` is the correctness-critical
//! operation of the whole engine. Implementations MUST perform the
//! duplicate-vote check, the vote insert, the `verify_count` increment, the
//! quorum comparison, and the `Verified` status flip inside one atomic unit
//! (a single write-lock critical section in memory; a transaction holding a
//! row lock on the store in PostgreSQL). A separate read-count-then-write-
//! status pair is forbidden: two voters confirming concurrently at
//! `count = threshold - 1` must produce exactly one transition.
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from configuration:
//! in-memory for development and tests, PostgreSQL for production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::domain::store::{DuplicatePolicy, Store, StoreId, StoreStatus, UserId};
use crate::domain::verification::{ConfirmResult, VerificationRequest};

/// Keyset-pagination cursor over `(created_at, id)`, newest first. The
/// encoded form is opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCursor {
    pub created_at: DateTime<Utc>,
    pub id: StoreId,
}

impl StoreCursor {
    pub fn after(store: &Store) -> Self {
        Self {
            created_at: store.created_at,
            id: store.id,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.created_at.to_rfc3339(), self.id)
    }

    pub fn decode(token: &str) -> Option<Self> {
        let (ts, id) = token.split_once('|')?;
        let created_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
        let id = StoreId::from_uuid(uuid::Uuid::parse_str(id).ok()?);
        Some(Self { created_at, id })
    }
}

/// One page of a status-filtered store listing.
#[derive(Debug, Clone)]
pub struct StorePage {
    pub items: Vec<Store>,
    pub next_cursor: Option<String>,
}

/// Result of an archive call: the post-transition store, plus whether this
/// call performed the transition (repeat archives are idempotent no-ops).
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub store: Store,
    pub newly_archived: bool,
}

/// Repository interface for Store aggregates
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Insert a new store. With `DuplicatePolicy::Reject` the insert is
    /// guarded by the normalized name+location uniqueness check in the same
    /// atomic operation — the last line of defense against two
    /// near-simultaneous duplicate submissions — and fails with
    /// [`RepositoryError::Conflict`]. `CreateAnyway` skips the guard.
    async fn insert(&self, store: &Store, dedupe: DuplicatePolicy) -> Result<(), RepositoryError>;

    /// Find store by ID
    async fn find_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    /// Find a non-archived store with the given dedup key, if any.
    async fn find_duplicate(
        &self,
        name_key: &str,
        location_key: &str,
    ) -> Result<Option<Store>, RepositoryError>;

    /// Status-filtered listing, newest first, excluding stores the requester
    /// has suppressed via Ignore.
    async fn list_by_status(
        &self,
        status: StoreStatus,
        requester: &UserId,
        cursor: Option<StoreCursor>,
        limit: usize,
    ) -> Result<StorePage, RepositoryError>;

    /// Every store created by `owner`, all statuses, newest first.
    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Store>, RepositoryError>;

    /// Forward-only archive transition. Archiving an archived store is an
    /// idempotent no-op reported via [`ArchiveOutcome::newly_archived`].
    async fn archive(&self, id: StoreId) -> Result<ArchiveOutcome, RepositoryError>;
}

/// Repository interface for verification votes and the per-user
/// suppression set.
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// Atomically record a Confirm vote: duplicate check, vote insert,
    /// count increment, quorum comparison, and status flip in one unit.
    /// See the module docs for the contract.
    async fn apply_confirm(
        &self,
        store_id: StoreId,
        voter: &UserId,
        evidence: Option<String>,
        threshold: u32,
    ) -> Result<ConfirmResult, RepositoryError>;

    /// Insert/overwrite the `(store_id, voter)` suppression record. Never
    /// touches `verify_count`.
    async fn record_ignore(&self, store_id: StoreId, voter: &UserId)
        -> Result<(), RepositoryError>;

    /// All persisted Confirm records for a store, oldest first.
    async fn confirmations_for(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<VerificationRequest>, RepositoryError>;

    /// The set of stores this user has marked Ignore.
    async fn suppressions_for(&self, user: &UserId) -> Result<HashSet<StoreId>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate dedup key, duplicate vote).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient contention (lock/serialization failure); safe to retry.
    #[error("Contention: {0}")]
    Contention(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(db) => {
                // 40001 = serialization_failure, 40P01 = deadlock_detected
                let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                if code == "40001" || code == "40P01" {
                    RepositoryError::Contention(db.to_string())
                } else if db.is_unique_violation() {
                    RepositoryError::Conflict(db.to_string())
                } else {
                    RepositoryError::Database(db.to_string())
                }
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
