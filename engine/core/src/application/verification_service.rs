// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Verification Quorum Service
//!
//! Records per-voter decisions against a store and promotes it to Verified
//! once the quorum threshold of distinct confirmations is reached.
//!
//! ## Invariants enforced here
//!
//! - The creator can never confirm their own store (hard reject).
//! - Stale-state submissions (already Verified/Archived) and duplicate
//!   Confirms are idempotent no-op successes, safe to retry.
//! - Ignore decisions only populate the per-user suppression set.
//!
//! The atomic part — vote insert, count increment, quorum comparison, and
//! status flip in one unit — is the repository's `apply_confirm` contract;
//! this service adds the precondition cascade, bounded retry on transient
//! contention, and the exactly-once `StoreVerified` emission.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConfirmRetryConfig;
use crate::domain::events::StoreEvent;
use crate::domain::repository::{RepositoryError, StoreRepository, VerificationRepository};
use crate::domain::store::{StoreId, StoreStatus, UserId};
use crate::domain::verification::{
    ConfirmResult, Decision, VerificationError, VerificationOutcome,
};
use crate::infrastructure::event_bus::EventBus;

pub struct VerificationQuorumService {
    stores: Arc<dyn StoreRepository>,
    verifications: Arc<dyn VerificationRepository>,
    event_bus: EventBus,
    quorum_threshold: u32,
    retry: ConfirmRetryConfig,
}

impl VerificationQuorumService {
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        verifications: Arc<dyn VerificationRepository>,
        event_bus: EventBus,
        quorum_threshold: u32,
        retry: ConfirmRetryConfig,
    ) -> Self {
        Self {
            stores,
            verifications,
            event_bus,
            quorum_threshold,
            retry,
        }
    }

    pub fn quorum_threshold(&self) -> u32 {
        self.quorum_threshold
    }

    /// Record one voter's decision on one store.
    pub async fn submit(
        &self,
        store_id: StoreId,
        voter: &UserId,
        decision: Decision,
        evidence: Option<String>,
    ) -> Result<VerificationOutcome, VerificationError> {
        let store = self
            .stores
            .find_by_id(store_id)
            .await?
            .ok_or(VerificationError::NotFound(store_id))?;

        match store.status {
            StoreStatus::Verified => {
                return Ok(VerificationOutcome::AlreadyVerified {
                    verify_count: store.verify_count,
                })
            }
            StoreStatus::Archived => return Ok(VerificationOutcome::AlreadyArchived),
            StoreStatus::Unverified => {}
        }

        if *voter == store.created_by {
            return Err(VerificationError::SelfVerificationForbidden);
        }

        match decision {
            Decision::Ignore => {
                self.verifications.record_ignore(store_id, voter).await?;
                debug!(store_id = %store_id, voter = %voter, "store suppressed for voter");
                self.event_bus
                    .publish_store_event(StoreEvent::VerificationRecorded {
                        store_id,
                        voter_id: voter.clone(),
                        decision,
                        verify_count: store.verify_count,
                        recorded_at: chrono::Utc::now(),
                    });
                Ok(VerificationOutcome::IgnoreRecorded {
                    status: store.status,
                })
            }
            Decision::Confirm => {
                let result = self.confirm_with_retry(store_id, voter, evidence).await?;
                Ok(self.settle_confirm(store_id, voter, result))
            }
        }
    }

    fn settle_confirm(
        &self,
        store_id: StoreId,
        voter: &UserId,
        result: ConfirmResult,
    ) -> VerificationOutcome {
        match result {
            ConfirmResult::Applied {
                verify_count,
                status,
                newly_verified,
            } => {
                self.event_bus
                    .publish_store_event(StoreEvent::VerificationRecorded {
                        store_id,
                        voter_id: voter.clone(),
                        decision: Decision::Confirm,
                        verify_count,
                        recorded_at: chrono::Utc::now(),
                    });
                if newly_verified {
                    info!(store_id = %store_id, verify_count, "store reached quorum, now verified");
                    self.event_bus
                        .publish_store_event(StoreEvent::StoreVerified {
                            store_id,
                            verify_count,
                            verified_at: chrono::Utc::now(),
                        });
                }
                VerificationOutcome::Applied {
                    status,
                    verify_count,
                    newly_verified,
                }
            }
            ConfirmResult::Duplicate {
                verify_count,
                status,
            } => VerificationOutcome::DuplicateConfirm {
                status,
                verify_count,
            },
            ConfirmResult::AlreadyClosed {
                verify_count,
                status,
            } => match status {
                StoreStatus::Archived => VerificationOutcome::AlreadyArchived,
                _ => VerificationOutcome::AlreadyVerified { verify_count },
            },
        }
    }

    /// Bounded exponential backoff on transient contention. Safe because a
    /// retried Confirm that already landed is a duplicate no-op.
    async fn confirm_with_retry(
        &self,
        store_id: StoreId,
        voter: &UserId,
        evidence: Option<String>,
    ) -> Result<ConfirmResult, RepositoryError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 1u32;
        loop {
            match self
                .verifications
                .apply_confirm(store_id, voter, evidence.clone(), self.quorum_threshold)
                .await
            {
                Err(RepositoryError::Contention(reason)) if attempt < self.retry.attempts.max(1) => {
                    warn!(
                        store_id = %store_id,
                        attempt,
                        %reason,
                        "confirm hit contention, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::{DuplicatePolicy, Store};
    use crate::domain::submission::{StoreSubmission, SubmissionValidator};
    use crate::infrastructure::repositories::InMemoryDirectory;

    fn sample_store(owner: &str) -> Store {
        let normalized = SubmissionValidator::validate(&StoreSubmission {
            name: "Iya Moria".to_string(),
            phone: "+2348110453053".to_string(),
            location: "13 Moria Rd".to_string(),
            opens_at: "08:30".to_string(),
            closes_at: "21:00".to_string(),
            description: "Great amala spot".to_string(),
            photo_ref: None,
        })
        .unwrap();
        Store::from_submission(UserId::new(owner), normalized)
    }

    async fn service_with_store(owner: &str) -> (VerificationQuorumService, StoreId) {
        let directory = InMemoryDirectory::new();
        let store = sample_store(owner);
        directory
            .insert(&store, DuplicatePolicy::Reject)
            .await
            .unwrap();
        let service = VerificationQuorumService::new(
            Arc::new(directory.clone()),
            Arc::new(directory),
            EventBus::new(64),
            3,
            ConfirmRetryConfig::default(),
        );
        (service, store.id)
    }

    #[tokio::test]
    async fn test_self_verification_always_rejected() {
        let (service, store_id) = service_with_store("owner-1").await;

        let err = service
            .submit(store_id, &UserId::new("owner-1"), Decision::Confirm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::SelfVerificationForbidden));

        // and the count is untouched
        let outcome = service
            .submit(store_id, &UserId::new("voter-1"), Decision::Confirm, None)
            .await
            .unwrap();
        assert_eq!(outcome.verify_count(), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_store_is_not_found() {
        let (service, _) = service_with_store("owner-1").await;
        let err = service
            .submit(StoreId::new(), &UserId::new("voter-1"), Decision::Confirm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ignore_never_touches_verify_count() {
        let (service, store_id) = service_with_store("owner-1").await;

        let outcome = service
            .submit(store_id, &UserId::new("voter-1"), Decision::Ignore, None)
            .await
            .unwrap();
        assert!(matches!(outcome, VerificationOutcome::IgnoreRecorded { .. }));

        let outcome = service
            .submit(store_id, &UserId::new("voter-2"), Decision::Confirm, None)
            .await
            .unwrap();
        assert_eq!(outcome.verify_count(), Some(1));
    }
}
