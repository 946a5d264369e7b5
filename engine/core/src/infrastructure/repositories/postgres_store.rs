// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::repository::{
    ArchiveOutcome, RepositoryError, StoreCursor, StorePage, StoreRepository,
};
use crate::domain::store::{DuplicatePolicy, GeoPoint, Store, StoreId, StoreStatus, UserId};

pub struct PostgresStoreRepository {
    pool: PgPool,
}

impl PostgresStoreRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

const STORE_COLUMNS: &str = "id, name, phone, location, lat, lng, opens_at, closes_at, \
                             description, photo_ref, created_by, created_at, status, verify_count";

pub(super) fn store_from_row(row: &PgRow) -> Result<Store, RepositoryError> {
    let lat: Option<f64> = row.try_get("lat")?;
    let lng: Option<f64> = row.try_get("lng")?;
    let status: StoreStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(RepositoryError::Serialization)?;

    Ok(Store {
        id: StoreId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        location: row.try_get("location")?,
        position: lat.zip(lng).map(|(lat, lng)| GeoPoint { lat, lng }),
        opens_at: row.try_get::<NaiveTime, _>("opens_at")?,
        closes_at: row.try_get::<NaiveTime, _>("closes_at")?,
        description: row.try_get("description")?,
        photo_ref: row.try_get("photo_ref")?,
        created_by: UserId::new(row.try_get::<String, _>("created_by")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        status,
        verify_count: row.try_get::<i32, _>("verify_count")? as u32,
    })
}

#[async_trait]
impl StoreRepository for PostgresStoreRepository {
    async fn insert(&self, store: &Store, dedupe: DuplicatePolicy) -> Result<(), RepositoryError> {
        let (name_key, location_key) = store.dedup_key();
        // The partial unique index on (name_key, location_key) turns a
        // duplicate race into a Conflict; CreateAnyway rows are exempt.
        sqlx::query(
            r#"
            INSERT INTO stores (id, name, phone, location, lat, lng, opens_at, closes_at,
                                description, photo_ref, created_by, created_at, status,
                                verify_count, name_key, location_key, dedup_exempt)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(store.id.as_uuid())
        .bind(&store.name)
        .bind(&store.phone)
        .bind(&store.location)
        .bind(store.position.map(|p| p.lat))
        .bind(store.position.map(|p| p.lng))
        .bind(store.opens_at)
        .bind(store.closes_at)
        .bind(&store.description)
        .bind(&store.photo_ref)
        .bind(store.created_by.as_str())
        .bind(store.created_at)
        .bind(store.status.as_str())
        .bind(store.verify_count as i32)
        .bind(&name_key)
        .bind(&location_key)
        .bind(dedupe == DuplicatePolicy::CreateAnyway)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM stores WHERE id = $1", STORE_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn find_duplicate(
        &self,
        name_key: &str,
        location_key: &str,
    ) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM stores
            WHERE name_key = $1 AND location_key = $2 AND status <> 'archived'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            STORE_COLUMNS
        ))
        .bind(name_key)
        .bind(location_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn list_by_status(
        &self,
        status: StoreStatus,
        requester: &UserId,
        cursor: Option<StoreCursor>,
        limit: usize,
    ) -> Result<StorePage, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM stores s
            WHERE s.status = $1
              AND NOT EXISTS (
                  SELECT 1 FROM verification_requests v
                  WHERE v.store_id = s.id AND v.voter_id = $2 AND v.decision = 'ignore'
              )
              AND ($3::timestamptz IS NULL OR (s.created_at, s.id) < ($3, $4))
            ORDER BY s.created_at DESC, s.id DESC
            LIMIT $5
            "#,
            STORE_COLUMNS
        ))
        .bind(status.as_str())
        .bind(requester.as_str())
        .bind(cursor.map(|c| c.created_at))
        .bind(cursor.map(|c| c.id.as_uuid()))
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows
            .iter()
            .map(store_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = items.len() > limit;
        items.truncate(limit);
        let next_cursor = if has_more {
            items.last().map(|store| StoreCursor::after(store).encode())
        } else {
            None
        };

        Ok(StorePage { items, next_cursor })
    }

    async fn list_by_owner(&self, owner: &UserId) -> Result<Vec<Store>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM stores
            WHERE created_by = $1
            ORDER BY created_at DESC, id DESC
            "#,
            STORE_COLUMNS
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(store_from_row).collect()
    }

    async fn archive(&self, id: StoreId) -> Result<ArchiveOutcome, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE stores
            SET status = 'archived'
            WHERE id = $1 AND status <> 'archived'
            RETURNING {}
            "#,
            STORE_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ArchiveOutcome {
                store: store_from_row(&row)?,
                newly_archived: true,
            });
        }

        // Either already archived (idempotent no-op) or missing entirely.
        match self.find_by_id(id).await? {
            Some(store) => Ok(ArchiveOutcome {
                store,
                newly_archived: false,
            }),
            None => Err(RepositoryError::NotFound(format!("store {}", id))),
        }
    }
}
