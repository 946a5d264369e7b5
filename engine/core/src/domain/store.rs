//! Store Domain Model
//!
//! This module defines the core domain entities and value objects for the
//! store directory. A `Store` is a community-submitted food vendor listing
//! that moves through a forward-only verification lifecycle.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Directory Context
//! - **Aggregate Root:** Store
//!
//! # Design Principles
//!
//! 1. **Forward-only lifecycle:** `Unverified → Verified`,
//!    `{Unverified|Verified} → Archived`; `Archived` is terminal
//! 2. **Domain-Driven:** uses ubiquitous language (Store, Quorum, Suppression)
//! 3. **Self-Validating:** stores are only born from a `NormalizedStore`
//!    produced by the submission validator

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::submission::NormalizedStore;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier for a Store listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub Uuid);

impl StoreId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an already-authenticated principal.
///
/// Identity issuance and validation are external collaborators; the engine
/// treats principal ids as opaque strings and never inspects their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects: Status & Position
// ============================================================================

/// Verification lifecycle status of a Store.
///
/// Transitions are forward-only:
///
/// ```text
/// Unverified --[quorum reached]--> Verified
/// Unverified --[moderator]------> Archived
/// Verified ---[moderator]------> Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Unverified,
    Verified,
    Archived,
}

impl StoreStatus {
    /// Whether confirmations can still change this store's state.
    pub fn accepts_confirmations(&self) -> bool {
        matches!(self, StoreStatus::Unverified)
    }

    /// `Archived` is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreStatus::Archived)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreStatus::Unverified => "unverified",
            StoreStatus::Verified => "verified",
            StoreStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for StoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(StoreStatus::Unverified),
            "verified" => Ok(StoreStatus::Verified),
            "archived" => Ok(StoreStatus::Archived),
            other => Err(format!("unknown store status '{}'", other)),
        }
    }
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coordinates attached by the external geocoder. Optional enrichment only;
/// core correctness never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Duplicate handling for store creation. `Reject` surfaces a conflict for
/// the submitter to disambiguate; `CreateAnyway` records the submitter's
/// explicit choice to list alongside the existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Reject,
    CreateAnyway,
}

// ============================================================================
// Aggregate Root: Store
// ============================================================================

/// Store Aggregate Root
///
/// A community-submitted vendor listing. Created from a validated submission,
/// mutated only by the verification quorum engine (`verify_count`/`status`)
/// or an administrative archive action.
///
/// # Invariants
/// - `verify_count` equals the number of distinct confirming voters
/// - `status` transitions only forward
/// - the creator can never confirm their own store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub phone: String,
    /// Free-text location; coordinates are an external geocoder's concern.
    pub location: String,
    pub position: Option<GeoPoint>,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub description: String,
    pub photo_ref: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub status: StoreStatus,
    pub verify_count: u32,
}

impl Store {
    /// Create an Unverified store from a validated submission.
    pub fn from_submission(owner: UserId, normalized: NormalizedStore) -> Self {
        Self {
            id: StoreId::new(),
            name: normalized.name,
            phone: normalized.phone,
            location: normalized.location,
            position: None,
            opens_at: normalized.opens_at,
            closes_at: normalized.closes_at,
            description: normalized.description,
            photo_ref: normalized.photo_ref,
            created_by: owner,
            created_at: Utc::now(),
            status: StoreStatus::Unverified,
            verify_count: 0,
        }
    }

    /// Duplicate-detection key: normalized name + normalized location text.
    pub fn dedup_key(&self) -> (String, String) {
        (
            crate::domain::submission::normalize_key(&self.name),
            crate::domain::submission::normalize_key(&self.location),
        )
    }
}
