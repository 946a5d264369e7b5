// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Schema Bootstrap
//!
//! Creates the engine's tables and indexes if they do not exist. Two
//! indexes carry invariants the application also checks optimistically:
//!
//! - `stores_dedup_key`: at most one live, non-exempt store per normalized
//!   name+location key — the last line of defense against two
//!   near-simultaneous duplicate submissions. Rows created with an explicit
//!   "create anyway" are exempt, and archived rows free their key.
//! - `verification_one_confirm_per_voter`: at most one Confirm per
//!   `(store_id, voter_id)`.

use sqlx::postgres::PgPool;

use crate::domain::repository::RepositoryError;

pub async fn run_migrations(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stores (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT NOT NULL,
            location TEXT NOT NULL,
            lat DOUBLE PRECISION,
            lng DOUBLE PRECISION,
            opens_at TIME NOT NULL,
            closes_at TIME NOT NULL,
            description TEXT NOT NULL,
            photo_ref TEXT,
            created_by TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            status TEXT NOT NULL,
            verify_count INTEGER NOT NULL DEFAULT 0,
            name_key TEXT NOT NULL,
            location_key TEXT NOT NULL,
            dedup_exempt BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS stores_dedup_key
        ON stores (name_key, location_key)
        WHERE status <> 'archived' AND NOT dedup_exempt
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS stores_status_created
        ON stores (status, created_at DESC, id DESC)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS stores_owner ON stores (created_by)"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_requests (
            id UUID PRIMARY KEY,
            store_id UUID NOT NULL REFERENCES stores (id),
            voter_id TEXT NOT NULL,
            decision TEXT NOT NULL,
            evidence TEXT,
            submitted_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS verification_one_confirm_per_voter
        ON verification_requests (store_id, voter_id)
        WHERE decision = 'confirm'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS verification_one_ignore_per_voter
        ON verification_requests (store_id, voter_id)
        WHERE decision = 'ignore'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS verification_suppressions_by_voter
        ON verification_requests (voter_id)
        WHERE decision = 'ignore'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
