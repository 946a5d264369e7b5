// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Verification Repository
//!
//! `apply_confirm` is the correctness-critical operation: one transaction
//! takes a row-level lock on the store (`SELECT ... FOR UPDATE`), inserts
//! the vote idempotently, and performs the count increment together with the
//! threshold flip in a single `UPDATE`. Two voters confirming concurrently
//! at `count = threshold - 1` therefore serialize on the row lock and the
//! transition fires exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::repository::{RepositoryError, VerificationRepository};
use crate::domain::store::{StoreId, StoreStatus, UserId};
use crate::domain::verification::{
    ConfirmResult, Decision, VerificationId, VerificationRequest,
};

pub struct PostgresVerificationRepository {
    pool: PgPool,
}

impl PostgresVerificationRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: String) -> Result<StoreStatus, RepositoryError> {
    raw.parse().map_err(RepositoryError::Serialization)
}

#[async_trait]
impl VerificationRepository for PostgresVerificationRepository {
    async fn apply_confirm(
        &self,
        store_id: StoreId,
        voter: &UserId,
        evidence: Option<String>,
        threshold: u32,
    ) -> Result<ConfirmResult, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Row lock: every confirm for this store serializes here.
        let row = sqlx::query("SELECT status, verify_count FROM stores WHERE id = $1 FOR UPDATE")
            .bind(store_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(format!("store {}", store_id)));
        };
        let status = parse_status(row.try_get::<String, _>("status")?)?;
        let verify_count = row.try_get::<i32, _>("verify_count")? as u32;

        if !status.accepts_confirmations() {
            return Ok(ConfirmResult::AlreadyClosed {
                verify_count,
                status,
            });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO verification_requests (id, store_id, voter_id, decision, evidence, submitted_at)
            VALUES ($1, $2, $3, 'confirm', $4, $5)
            ON CONFLICT (store_id, voter_id) WHERE decision = 'confirm' DO NOTHING
            "#,
        )
        .bind(VerificationId::new().0)
        .bind(store_id.as_uuid())
        .bind(voter.as_str())
        .bind(&evidence)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(ConfirmResult::Duplicate {
                verify_count,
                status,
            });
        }

        // Increment and threshold comparison in the same write.
        let row = sqlx::query(
            r#"
            UPDATE stores
            SET verify_count = verify_count + 1,
                status = CASE WHEN verify_count + 1 >= $2 THEN 'verified' ELSE status END
            WHERE id = $1
            RETURNING status, verify_count
            "#,
        )
        .bind(store_id.as_uuid())
        .bind(threshold as i32)
        .fetch_one(&mut *tx)
        .await?;
        let new_status = parse_status(row.try_get::<String, _>("status")?)?;
        let new_count = row.try_get::<i32, _>("verify_count")? as u32;

        tx.commit().await?;

        Ok(ConfirmResult::Applied {
            verify_count: new_count,
            status: new_status,
            newly_verified: new_status == StoreStatus::Verified,
        })
    }

    async fn record_ignore(
        &self,
        store_id: StoreId,
        voter: &UserId,
    ) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM stores WHERE id = $1")
            .bind(store_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound(format!("store {}", store_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO verification_requests (id, store_id, voter_id, decision, evidence, submitted_at)
            VALUES ($1, $2, $3, 'ignore', NULL, $4)
            ON CONFLICT (store_id, voter_id) WHERE decision = 'ignore'
            DO UPDATE SET submitted_at = EXCLUDED.submitted_at
            "#,
        )
        .bind(VerificationId::new().0)
        .bind(store_id.as_uuid())
        .bind(voter.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn confirmations_for(
        &self,
        store_id: StoreId,
    ) -> Result<Vec<VerificationRequest>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, voter_id, evidence, submitted_at
            FROM verification_requests
            WHERE store_id = $1 AND decision = 'confirm'
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(store_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(VerificationRequest {
                    id: VerificationId(row.try_get::<Uuid, _>("id")?),
                    store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
                    voter_id: UserId::new(row.try_get::<String, _>("voter_id")?),
                    decision: Decision::Confirm,
                    evidence: row.try_get("evidence")?,
                    submitted_at: row.try_get::<DateTime<Utc>, _>("submitted_at")?,
                })
            })
            .collect()
    }

    async fn suppressions_for(&self, user: &UserId) -> Result<HashSet<StoreId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT store_id FROM verification_requests WHERE voter_id = $1 AND decision = 'ignore'",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?)))
            .collect()
    }
}
