// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Buka Engine Core
//!
//! Store onboarding and crowd-verification engine for the Buka food vendor
//! directory.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Slot-filling dialogue, submission validation, store
//!   lifecycle, and quorum verification

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
