//! Link repository

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Link, LinkId, SyncState, Tag};
use crate::repositories::ItemRepository;

/// SQLite implementation of the link collection adapter
pub struct SqliteLinkRepository {
    pool: SqlitePool,
}

impl SqliteLinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_tags(&self, id: &str) -> Result<Vec<Tag>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, added_at FROM link_tags WHERE link_id = ? ORDER BY added_at, name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, added_at)| Tag::with_added(name, added_at))
            .collect())
    }

    async fn hydrate(&self, row: LinkRow) -> Result<Link> {
        let tags = self.load_tags(&row.id).await?;
        row.into_link(tags)
    }

    async fn fetch_many(&self, query: &str) -> Result<Vec<Link>> {
        let rows = sqlx::query_as::<_, LinkRow>(query)
            .fetch_all(&self.pool)
            .await?;

        let mut links = Vec::with_capacity(rows.len());
        for row in rows {
            links.push(self.hydrate(row).await?);
        }
        Ok(links)
    }

    /// Upsert the item row and replace its tags in one transaction.
    async fn save_row(&self, item: &Link, state: &SyncState) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO links (
                id, created_at, updated_at, url, title, disabled,
                etag, duplicated, conflicted, deleted, synced
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                url = excluded.url,
                title = excluded.title,
                disabled = excluded.disabled,
                etag = excluded.etag,
                duplicated = excluded.duplicated,
                conflicted = excluded.conflicted,
                deleted = excluded.deleted,
                synced = excluded.synced
            RETURNING row_id
            "#,
        )
        .bind(item.id().to_string())
        .bind(item.created_at())
        .bind(item.updated_at())
        .bind(item.url())
        .bind(item.title())
        .bind(item.is_disabled())
        .bind(state.etag())
        .bind(state.duplicated_slot())
        .bind(state.is_conflicted())
        .bind(state.is_deleted())
        .bind(state.is_synced())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM link_tags WHERE link_id = ?")
            .bind(item.id().to_string())
            .execute(&mut *tx)
            .await?;

        for tag in item.tags() {
            sqlx::query("INSERT INTO link_tags (link_id, name, added_at) VALUES (?, ?, ?)")
                .bind(item.id().to_string())
                .bind(tag.name())
                .bind(tag.added_at())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(row_id)
    }
}

/// Database row representation of a link
#[derive(Debug, FromRow)]
struct LinkRow {
    row_id: i64,
    id: String,
    created_at: i64,
    updated_at: i64,
    url: String,
    title: Option<String>,
    disabled: bool,
    etag: Option<String>,
    duplicated: i32,
    conflicted: bool,
    deleted: bool,
    synced: bool,
}

impl LinkRow {
    fn into_link(self, tags: Vec<Tag>) -> Result<Link> {
        let id = LinkId::from_string(&self.id)
            .map_err(|e| StoreError::InvalidData(format!("Invalid link id {}: {}", self.id, e)))?;

        let state = SyncState::from_parts(
            Some(self.row_id),
            self.etag,
            self.duplicated,
            self.conflicted,
            self.deleted,
            self.synced,
        );

        Ok(Link::restore(
            id,
            self.created_at,
            self.updated_at,
            self.url,
            self.title,
            self.disabled,
            tags,
            state,
        ))
    }
}

const SELECT_COLUMNS: &str = "row_id, id, created_at, updated_at, url, title, disabled, \
                              etag, duplicated, conflicted, deleted, synced";

#[async_trait]
impl ItemRepository<Link> for SqliteLinkRepository {
    async fn get_all(&self) -> Result<Vec<Link>> {
        self.fetch_many(&format!("SELECT {SELECT_COLUMNS} FROM links ORDER BY row_id"))
            .await
    }

    async fn get_unsynced(&self) -> Result<Vec<Link>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM links WHERE synced = 0 AND conflicted = 0 ORDER BY row_id"
        ))
        .await
    }

    async fn get_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM links ORDER BY row_id")
            .fetch_all(&self.pool)
            .await?;

        ids.iter()
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|e| StoreError::InvalidData(format!("Invalid link id {}: {}", id, e)))
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Link> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM links WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.hydrate(row).await
    }

    async fn save(&self, item: &Link) -> Result<i64> {
        self.save_row(item, item.state()).await
    }

    async fn save_duplicated(&self, item: &Link) -> Result<i64> {
        let etag = item.state().etag().ok_or_else(|| {
            StoreError::InvalidData("Duplicate save requires a version tag".to_string())
        })?;

        let next_slot: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(duplicated), 0) + 1 FROM links WHERE url = ?")
                .bind(item.url())
                .fetch_one(&self.pool)
                .await?;

        debug!("Storing duplicate link {} in slot {}", item.id(), next_slot);
        let state = SyncState::duplicated(etag, next_slot as i32);
        self.save_row(item, &state).await
    }

    async fn update_sync_state(&self, id: Uuid, state: &SyncState) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE links SET
                etag = ?, duplicated = ?, conflicted = ?, deleted = ?, synced = ?
            WHERE id = ?
            "#,
        )
        .bind(state.etag())
        .bind(state.duplicated_slot())
        .bind(state.is_conflicted())
        .bind(state.is_deleted())
        .bind(state.is_synced())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn reset_sync_states(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE links SET etag = NULL, synced = 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn has_conflicted(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE conflicted = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn has_unsynced(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM links WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn get_main(&self, duplicated_key: &str) -> Result<Link> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM links WHERE url = ? AND duplicated = 0"
        ))
        .bind(duplicated_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(duplicated_key.to_string()))?;

        self.hydrate(row).await
    }
}

// ============================================================================
// Tests
// ============================================================================
