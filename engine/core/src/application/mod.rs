// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dialogue_engine;
pub mod store_lifecycle;
pub mod verification_service;

pub use dialogue_engine::{DialogueEngine, DialogueError};
pub use store_lifecycle::{
    ArchiveError, CreateStoreError, ListStoresError, StoreLifecycleService,
};
pub use verification_service::VerificationQuorumService;
