// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the store lifecycle manager.
//!
//! Covered here:
//! - A valid submission creates an Unverified store with verify_count = 0
//! - Duplicate detection requires explicit disambiguation, and "create
//!   anyway" is honored
//! - Cursor pagination walks the full listing without overlap
//! - Owner listing spans all statuses
//! - Archive is forward-only and idempotent; verified stores can be archived

use std::collections::HashSet;
use std::sync::Arc;

use buka_core::application::{ArchiveError, CreateStoreError, StoreLifecycleService, VerificationQuorumService};
use buka_core::config::ConfirmRetryConfig;
use buka_core::domain::store::{DuplicatePolicy, StoreId, StoreStatus, UserId};
use buka_core::domain::submission::StoreSubmission;
use buka_core::domain::verification::Decision;
use buka_core::infrastructure::event_bus::EventBus;
use buka_core::infrastructure::repositories::InMemoryDirectory;

fn submission(name: &str, location: &str) -> StoreSubmission {
    StoreSubmission {
        name: name.to_string(),
        phone: "+2348110453053".to_string(),
        location: location.to_string(),
        opens_at: "08:30".to_string(),
        closes_at: "21:00".to_string(),
        description: "Great amala spot".to_string(),
        photo_ref: None,
    }
}

fn services() -> (Arc<StoreLifecycleService>, Arc<VerificationQuorumService>) {
    let directory = InMemoryDirectory::new();
    let event_bus = EventBus::new(256);
    let lifecycle = Arc::new(StoreLifecycleService::new(
        Arc::new(directory.clone()),
        event_bus.clone(),
        20,
        100,
    ));
    let verification = Arc::new(VerificationQuorumService::new(
        Arc::new(directory.clone()),
        Arc::new(directory),
        event_bus,
        3,
        ConfirmRetryConfig::default(),
    ));
    (lifecycle, verification)
}

#[tokio::test]
async fn test_valid_submission_creates_unverified_store() {
    let (lifecycle, _) = services();

    let store = lifecycle
        .create(
            UserId::new("owner-1"),
            &submission("Iya Moria", "13 Moria Rd"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap();

    assert_eq!(store.status, StoreStatus::Unverified);
    assert_eq!(store.verify_count, 0);
    assert_eq!(store.name, "Iya Moria");
    assert_eq!(store.created_by, UserId::new("owner-1"));
    assert!(store.position.is_none());
}

#[tokio::test]
async fn test_duplicate_detected_across_whitespace_and_case() {
    let (lifecycle, _) = services();
    let first = lifecycle
        .create(
            UserId::new("owner-1"),
            &submission("Iya Moria", "13 Moria Rd"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap();

    let err = lifecycle
        .create(
            UserId::new("owner-2"),
            &submission("  iya   MORIA ", "13  moria rd"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap_err();
    match err {
        CreateStoreError::Duplicate { existing_store_id } => {
            assert_eq!(existing_store_id, first.id)
        }
        other => panic!("expected Duplicate, got {:?}", other),
    }

    let second = lifecycle
        .create(
            UserId::new("owner-2"),
            &submission("Iya Moria", "13 Moria Rd"),
            DuplicatePolicy::CreateAnyway,
        )
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn test_pagination_walks_listing_without_overlap() {
    let (lifecycle, _) = services();
    for i in 0..7 {
        lifecycle
            .create(
                UserId::new("owner-1"),
                &submission(&format!("Spot {}", i), &format!("{} Road", i)),
                DuplicatePolicy::Reject,
            )
            .await
            .unwrap();
    }

    let requester = UserId::new("reader");
    let mut seen: HashSet<StoreId> = HashSet::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = lifecycle
            .list_by_status(
                StoreStatus::Unverified,
                &requester,
                cursor.as_deref(),
                Some(3),
            )
            .await
            .unwrap();
        assert!(page.items.len() <= 3);
        for store in &page.items {
            assert!(seen.insert(store.id), "store repeated across pages");
        }
        match page.next_cursor {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }
    assert_eq!(seen.len(), 7);
}

#[tokio::test]
async fn test_owner_listing_spans_all_statuses() {
    let (lifecycle, verification) = services();
    let owner = UserId::new("owner-1");

    let kept = lifecycle
        .create(owner.clone(), &submission("Spot A", "1 Road"), DuplicatePolicy::Reject)
        .await
        .unwrap();
    let archived = lifecycle
        .create(owner.clone(), &submission("Spot B", "2 Road"), DuplicatePolicy::Reject)
        .await
        .unwrap();
    let verified = lifecycle
        .create(owner.clone(), &submission("Spot C", "3 Road"), DuplicatePolicy::Reject)
        .await
        .unwrap();

    lifecycle
        .archive(archived.id, UserId::new("mod-1"), "closed down")
        .await
        .unwrap();
    for voter in ["v1", "v2", "v3"] {
        verification
            .submit(verified.id, &UserId::new(voter), Decision::Confirm, None)
            .await
            .unwrap();
    }

    let listed = lifecycle.list_by_owner(&owner).await.unwrap();
    let ids: HashSet<StoreId> = listed.iter().map(|store| store.id).collect();
    assert_eq!(ids, HashSet::from([kept.id, archived.id, verified.id]));
}

#[tokio::test]
async fn test_archive_is_forward_only_and_idempotent() {
    let (lifecycle, verification) = services();
    let store = lifecycle
        .create(
            UserId::new("owner-1"),
            &submission("Iya Moria", "13 Moria Rd"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap();

    // verified stores can still be archived
    for voter in ["v1", "v2", "v3"] {
        verification
            .submit(store.id, &UserId::new(voter), Decision::Confirm, None)
            .await
            .unwrap();
    }
    let archived = lifecycle
        .archive(store.id, UserId::new("mod-1"), "duplicate listing")
        .await
        .unwrap();
    assert_eq!(archived.status, StoreStatus::Archived);

    // repeat archive is a no-op success, never a backward transition
    let again = lifecycle
        .archive(store.id, UserId::new("mod-1"), "duplicate listing")
        .await
        .unwrap();
    assert_eq!(again.status, StoreStatus::Archived);

    let missing = lifecycle
        .archive(StoreId::new(), UserId::new("mod-1"), "nothing here")
        .await
        .unwrap_err();
    assert!(matches!(missing, ArchiveError::NotFound(_)));
}

#[tokio::test]
async fn test_verified_listing_shows_quorum_reached_stores() {
    let (lifecycle, verification) = services();
    let store = lifecycle
        .create(
            UserId::new("owner-1"),
            &submission("Iya Moria", "13 Moria Rd"),
            DuplicatePolicy::Reject,
        )
        .await
        .unwrap();
    for voter in ["v1", "v2", "v3"] {
        verification
            .submit(store.id, &UserId::new(voter), Decision::Confirm, None)
            .await
            .unwrap();
    }

    let reader = UserId::new("reader");
    let unverified = lifecycle
        .list_by_status(StoreStatus::Unverified, &reader, None, None)
        .await
        .unwrap();
    assert!(unverified.items.is_empty());

    let verified = lifecycle
        .list_by_status(StoreStatus::Verified, &reader, None, None)
        .await
        .unwrap();
    assert_eq!(verified.items.len(), 1);
    assert_eq!(verified.items[0].verify_count, 3);
}
