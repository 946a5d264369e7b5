//! In-memory repository implementations, used for development and tests.
//! PostgreSQL implementations live in the sibling `postgres_*` modules and
//! are selected at startup from configuration.

pub mod postgres;
pub mod postgres_store;
pub mod postgres_verification;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::repository::{
    ArchiveOutcome, RepositoryError, StoreCursor, StorePage, StoreRepository,
    VerificationRepository,
};
use crate::domain::store::{DuplicatePolicy, Store, StoreId, StoreStatus, UserId};
use crate::domain::verification::{ConfirmResult, VerificationRequest};

#[derive(Default)]
struct DirectoryState {
    stores: HashMap<StoreId, Store>,
    /// (name_key, location_key) -> live store, the uniqueness backstop.
    dedup: HashMap<(String, String), StoreId>,
    /// Confirm votes per store, keyed by voter for the one-vote invariant.
    confirms: HashMap<StoreId, HashMap<UserId, VerificationRequest>>,
    /// Per-user Ignore records (the suppression set).
    suppressions: HashMap<UserId, HashMap<StoreId, VerificationRequest>>,
}

/// Single in-memory backing store implementing both repository traits.
///
/// One `RwLock` over the whole directory state makes `apply_confirm` a
/// single write-lock critical section: duplicate check, vote insert, count
/// increment, quorum comparison, and status flip cannot interleave with any
/// other writer.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreRepository for InMemoryDirectory {
    async fn insert(&self, store: &Store, dedupe: DuplicatePolicy) -> Result<(), RepositoryError> {
        let mut state = self.inner.write().await;
        let key = store.dedup_key();

        if dedupe == DuplicatePolicy::Reject {
            let live_duplicate = state
                .dedup
                .get(&key)
                .and_then(|id| state.stores.get(id))
                .filter(|existing| existing.status != StoreStatus::Archived);
            if let Some(existing) = live_duplicate {
                return Err(RepositoryError::Conflict(format!(
                    "store {} already holds key {:?}",
                    existing.id, key
                )));
            }
        }

        state.dedup.insert(key, store.id);
        state.stores.insert(store.id, store.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let state = self.inner.read().await;
        Ok(state.stores.get(&id).cloned())
    }

    async fn find_duplicate(
        &self,
        name_key: &str,
        location_key: &str,
    ) -> Result<Option<Store>, RepositoryError> {
        let state = self.inner.read().await;
        let key = (name_key.to_string(), location_key.to_string());
        Ok(state
            .dedup
            .get(&key)
            .and_then(|id| state.stores.get(id))
            .filter(|store| store.status != StoreStatus::Archived)
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: StoreStatus,
        requester: &UserId,
        cursor: Option<StoreCursor>,
        limit: usize,
    ) -> Result<StorePage, RepositoryError> {
        let state = self.inner.read().await;
        let suppressed: HashSet<StoreId> = state
            .suppressions
            .get(requester)
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default();

        let mut matching: Vec<&Store> = state
            .stores
            .values()
            .filter(|store| store.status == status && !suppressed.contains(&store.id))
            .collect();
        // Newest first, id as tiebreaker, matching the cursor ordering.
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        if let Some(cursor) = cursor {
            matching.retain(|store| (store.created_at, store.id) < (cursor.created_at, cursor.id));
        }

        let has_more = matching.len() > limit;
        let items: Vec<Store> = matching.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            items.last().map(|store| StoreCursor::after(store).encode())
        } else {
            None
        };

        Ok(StorePage { items, next_cursor })
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Store>, RepositoryError> {
        let state = self.inner.read().await;
        let mut stores: Vec<Store> = state
            .stores
            .values()
            .filter(|store| store.created_by == *owner)
            .cloned()
            .collect();
        stores.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(stores)
    }

    async fn archive(&self, id: StoreId) -> Result<ArchiveOutcome, RepositoryError> {
        let mut state = self.inner.write().await;
        let key = match state.stores.get(&id) {
            Some(store) => store.dedup_key(),
            None => return Err(RepositoryError::NotFound(format!("store {}", id))),
        };
        let store = state.stores.get_mut(&id).expect("checked above");

        if store.status == StoreStatus::Archived {
            return Ok(ArchiveOutcome {
                store: store.clone(),
                newly_archived: false,
            });
        }

        store.status = StoreStatus::Archived;
        let archived = store.clone();
        // Archived stores no longer occupy their dedup key.
        if state.dedup.get(&key) == Some(&id) {
            state.dedup.remove(&key);
        }
        Ok(ArchiveOutcome {
            store: archived,
            newly_archived: true,
        })
    }
}

#[async_trait]
impl VerificationRepository for InMemoryDirectory {
    async fn apply_confirm(
        &self,
        store_id: StoreId,
        voter: &UserId,
        evidence: Option<String>,
        threshold: u32,
    ) -> Result<ConfirmResult, RepositoryError> {
        // Single write-lock critical section: no read-modify-write window.
        let mut state = self.inner.write().await;
        let state = &mut *state;

        let store = state
            .stores
            .get(&store_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("store {}", store_id)))?;

        if !store.status.accepts_confirmations() {
            return Ok(ConfirmResult::AlreadyClosed {
                verify_count: store.verify_count,
                status: store.status,
            });
        }

        let votes = state.confirms.entry(store_id).or_default();
        if votes.contains_key(voter) {
            let store = &state.stores[&store_id];
            return Ok(ConfirmResult::Duplicate {
                verify_count: store.verify_count,
                status: store.status,
            });
        }
        votes.insert(
            voter.clone(),
            VerificationRequest::confirm(store_id, voter.clone(), evidence),
        );

        let store = state.stores.get_mut(&store_id).expect("checked above");
        store.verify_count += 1;
        let newly_verified = store.verify_count >= threshold;
        if newly_verified {
            store.status = StoreStatus::Verified;
        }

        Ok(ConfirmResult::Applied {
            verify_count: store.verify_count,
            status: store.status,
            newly_verified,
        })
    }

    async fn record_ignore(
        &self,
        store_id: StoreId,
        voter: &UserId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.inner.write().await;
        if !state.stores.contains_key(&store_id) {
            return Err(RepositoryError::NotFound(format!("store {}", store_id)));
        }
        state
            .suppressions
            .entry(voter.clone())
            .or_default()
            .insert(store_id, VerificationRequest::ignore(store_id, voter.clone()));
        Ok(())
    }

    async fn confirmations_for(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<VerificationRequest>, RepositoryError> {
        let state = self.inner.read().await;
        let mut confirmations: Vec<VerificationRequest> = state
            .confirms
            .get(&store_id)
            .map(|votes| votes.values().cloned().collect())
            .unwrap_or_default();
        confirmations.sort_by_key(|request| request.submitted_at);
        Ok(confirmations)
    }

    async fn suppressions_for(&self, user: &UserId) -> Result<HashSet<StoreId>, RepositoryError> {
        let state = self.inner.read().await;
        Ok(state
            .suppressions
            .get(user)
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::submission::{StoreSubmission, SubmissionValidator};

    fn make_store(name: &str, location: &str, owner: &str) -> Store {
        let normalized = SubmissionValidator::validate(&StoreSubmission {
            name: name.to_string(),
            phone: "+2348110453053".to_string(),
            location: location.to_string(),
            opens_at: "08:30".to_string(),
            closes_at: "21:00".to_string(),
            description: "Great amala spot".to_string(),
            photo_ref: None,
        })
        .unwrap();
        Store::from_submission(UserId::new(owner), normalized)
    }

    #[tokio::test]
    async fn test_insert_rejects_live_duplicate_key() {
        let repo = InMemoryDirectory::new();
        let first = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&first, DuplicatePolicy::Reject).await.unwrap();

        let second = make_store("iya  moria", "13  MORIA rd", "owner-2");
        let err = repo.insert(&second, DuplicatePolicy::Reject).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        repo.insert(&second, DuplicatePolicy::CreateAnyway)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_archived_store_frees_its_dedup_key() {
        let repo = InMemoryDirectory::new();
        let first = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&first, DuplicatePolicy::Reject).await.unwrap();
        repo.archive(first.id).await.unwrap();

        let second = make_store("Iya Moria", "13 Moria Rd", "owner-2");
        repo.insert(&second, DuplicatePolicy::Reject).await.unwrap();
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        let repo = InMemoryDirectory::new();
        let store = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&store, DuplicatePolicy::Reject).await.unwrap();

        let first = repo.archive(store.id).await.unwrap();
        assert!(first.newly_archived);
        let second = repo.archive(store.id).await.unwrap();
        assert!(!second.newly_archived);
        assert_eq!(second.store.status, StoreStatus::Archived);
    }

    #[tokio::test]
    async fn test_apply_confirm_flips_status_at_threshold() {
        let repo = InMemoryDirectory::new();
        let store = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&store, DuplicatePolicy::Reject).await.unwrap();

        for (i, voter) in ["v1", "v2"].iter().enumerate() {
            let result = repo
                .apply_confirm(store.id, &UserId::new(*voter), None, 3)
                .await
                .unwrap();
            assert_eq!(
                result,
                ConfirmResult::Applied {
                    verify_count: i as u32 + 1,
                    status: StoreStatus::Unverified,
                    newly_verified: false,
                }
            );
        }

        let third = repo
            .apply_confirm(store.id, &UserId::new("v3"), None, 3)
            .await
            .unwrap();
        assert_eq!(
            third,
            ConfirmResult::Applied {
                verify_count: 3,
                status: StoreStatus::Verified,
                newly_verified: true,
            }
        );

        let fourth = repo
            .apply_confirm(store.id, &UserId::new("v4"), None, 3)
            .await
            .unwrap();
        assert_eq!(
            fourth,
            ConfirmResult::AlreadyClosed {
                verify_count: 3,
                status: StoreStatus::Verified,
            }
        );
    }

    #[tokio::test]
    async fn test_apply_confirm_duplicate_voter_is_noop() {
        let repo = InMemoryDirectory::new();
        let store = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&store, DuplicatePolicy::Reject).await.unwrap();

        let voter = UserId::new("v1");
        repo.apply_confirm(store.id, &voter, None, 3).await.unwrap();
        let repeat = repo.apply_confirm(store.id, &voter, None, 3).await.unwrap();

        assert_eq!(
            repeat,
            ConfirmResult::Duplicate {
                verify_count: 1,
                status: StoreStatus::Unverified,
            }
        );
        assert_eq!(repo.confirmations_for(store.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_suppression_filters_listing_for_that_user_only() {
        let repo = InMemoryDirectory::new();
        let store = make_store("Iya Moria", "13 Moria Rd", "owner-1");
        repo.insert(&store, DuplicatePolicy::Reject).await.unwrap();

        let ignorer = UserId::new("ignorer");
        repo.record_ignore(store.id, &ignorer).await.unwrap();

        let hidden = repo
            .list_by_status(StoreStatus::Unverified, &ignorer, None, 10)
            .await
            .unwrap();
        assert!(hidden.items.is_empty());

        let visible = repo
            .list_by_status(StoreStatus::Unverified, &UserId::new("someone-else"), None, 10)
            .await
            .unwrap();
        assert_eq!(visible.items.len(), 1);
    }

    #[tokio::test]
    async fn test_pagination_walks_without_overlap() {
        let repo = InMemoryDirectory::new();
        for i in 0..5 {
            let store = make_store(&format!("Spot {}", i), &format!("{} Road", i), "owner-1");
            repo.insert(&store, DuplicatePolicy::Reject).await.unwrap();
        }

        let requester = UserId::new("reader");
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let page = repo
                .list_by_status(StoreStatus::Unverified, &requester, cursor, 2)
                .await
                .unwrap();
            for store in &page.items {
                assert!(seen.insert(store.id), "store repeated across pages");
            }
            match page.next_cursor {
                Some(token) => cursor = StoreCursor::decode(&token),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
    }
}
