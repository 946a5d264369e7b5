// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Store Lifecycle Service
//!
//! Application service owning persisted [`Store`] records: creation with
//! duplicate detection, status/owner listings, and the administrative
//! archive transition. Status mutation on the verification path belongs to
//! [`crate::application::verification_service`], never here.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::repository::{RepositoryError, StoreCursor, StorePage, StoreRepository};
use crate::domain::store::{DuplicatePolicy, Store, StoreId, StoreStatus, UserId};
use crate::domain::submission::{FieldViolation, StoreSubmission, SubmissionValidator};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum CreateStoreError {
    /// Field-level violations, all reported in one pass. Recoverable: the
    /// submitter is re-prompted for exactly the offending fields.
    #[error("submission failed validation")]
    Invalid(Vec<FieldViolation>),

    /// A matching non-archived listing already exists. The submitter must
    /// explicitly choose to create anyway.
    #[error("a matching listing already exists: {existing_store_id}")]
    Duplicate { existing_store_id: StoreId },

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum ListStoresError {
    #[error("invalid cursor token")]
    InvalidCursor,

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("store not found: {0}")]
    NotFound(StoreId),

    #[error(transparent)]
    Storage(RepositoryError),
}

pub struct StoreLifecycleService {
    stores: Arc<dyn StoreRepository>,
    event_bus: EventBus,
    default_page_size: usize,
    max_page_size: usize,
}

impl StoreLifecycleService {
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        event_bus: EventBus,
        default_page_size: usize,
        max_page_size: usize,
    ) -> Self {
        Self {
            stores,
            event_bus,
            default_page_size,
            max_page_size,
        }
    }

    /// Validate a submission and create an Unverified store with
    /// `verify_count = 0`.
    ///
    /// The duplicate check is best-effort optimistic (read-then-create); the
    /// repository's uniqueness constraint on the normalized name+location
    /// key is the last line of defense against two near-simultaneous
    /// duplicate submissions, and its conflict is mapped back to the same
    /// `Duplicate` error.
    pub async fn create(
        &self,
        owner: UserId,
        submission: &StoreSubmission,
        policy: DuplicatePolicy,
    ) -> Result<Store, CreateStoreError> {
        let normalized =
            SubmissionValidator::validate(submission).map_err(CreateStoreError::Invalid)?;

        if policy == DuplicatePolicy::Reject {
            if let Some(existing) = self
                .stores
                .find_duplicate(&normalized.name_key(), &normalized.location_key())
                .await?
            {
                debug!(existing = %existing.id, "duplicate submission rejected");
                return Err(CreateStoreError::Duplicate {
                    existing_store_id: existing.id,
                });
            }
        }

        let store = Store::from_submission(owner, normalized);
        match self.stores.insert(&store, policy).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                // Lost the optimistic race; surface the winner.
                let (name_key, location_key) = store.dedup_key();
                let existing = self.stores.find_duplicate(&name_key, &location_key).await?;
                return Err(match existing {
                    Some(winner) => CreateStoreError::Duplicate {
                        existing_store_id: winner.id,
                    },
                    None => CreateStoreError::Storage(RepositoryError::Conflict(
                        "duplicate submission raced with an archive".to_string(),
                    )),
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(store_id = %store.id, name = %store.name, "store created");
        self.event_bus
            .publish_store_event(crate::domain::events::StoreEvent::StoreCreated {
                store_id: store.id,
                name: store.name.clone(),
                created_by: store.created_by.clone(),
                created_at: store.created_at,
            });
        Ok(store)
    }

    /// Status-filtered listing, newest first, with the requester's
    /// suppression set applied and an opaque keyset cursor.
    pub async fn list_by_status(
        &self,
        status: StoreStatus,
        requester: &UserId,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<StorePage, ListStoresError> {
        let limit = limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let cursor = match cursor {
            Some(token) => {
                Some(StoreCursor::decode(token).ok_or(ListStoresError::InvalidCursor)?)
            }
            None => None,
        };
        Ok(self
            .stores
            .list_by_status(status, requester, cursor, limit)
            .await?)
    }

    /// Every store created by `owner`, all statuses.
    pub async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Store>, RepositoryError> {
        self.stores.list_by_owner(owner).await
    }

    pub async fn find_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        self.stores.find_by_id(id).await
    }

    /// Administrative archive. Forward-only; archiving an archived store is
    /// an idempotent no-op success.
    pub async fn archive(
        &self,
        store_id: StoreId,
        moderator: UserId,
        reason: impl Into<String>,
    ) -> Result<Store, ArchiveError> {
        let reason = reason.into();
        let outcome = match self.stores.archive(store_id).await {
            Ok(outcome) => outcome,
            Err(RepositoryError::NotFound(_)) => return Err(ArchiveError::NotFound(store_id)),
            Err(err) => return Err(ArchiveError::Storage(err)),
        };

        if outcome.newly_archived {
            info!(store_id = %store_id, moderator = %moderator, "store archived");
            self.event_bus
                .publish_store_event(crate::domain::events::StoreEvent::StoreArchived {
                    store_id,
                    moderator_id: moderator,
                    reason,
                    archived_at: chrono::Utc::now(),
                });
        }
        Ok(outcome.store)
    }
}
