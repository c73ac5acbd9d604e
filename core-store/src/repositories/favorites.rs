//! Favorite repository

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Favorite, FavoriteId, SyncState, Tag};
use crate::repositories::ItemRepository;

/// SQLite implementation of the favorite collection adapter
pub struct SqliteFavoriteRepository {
    pool: SqlitePool,
}

impl SqliteFavoriteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_tags(&self, id: &str) -> Result<Vec<Tag>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, added_at FROM favorite_tags WHERE favorite_id = ? ORDER BY added_at, name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, added_at)| Tag::with_added(name, added_at))
            .collect())
    }

    async fn hydrate(&self, row: FavoriteRow) -> Result<Favorite> {
        let tags = self.load_tags(&row.id).await?;
        row.into_favorite(tags)
    }

    async fn fetch_many(&self, query: &str) -> Result<Vec<Favorite>> {
        let rows = sqlx::query_as::<_, FavoriteRow>(query)
            .fetch_all(&self.pool)
            .await?;

        let mut favorites = Vec::with_capacity(rows.len());
        for row in rows {
            favorites.push(self.hydrate(row).await?);
        }
        Ok(favorites)
    }

    async fn save_row(&self, item: &Favorite, state: &SyncState) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO favorites (
                id, added_at, name, etag, duplicated, conflicted, deleted, synced
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                added_at = excluded.added_at,
                name = excluded.name,
                etag = excluded.etag,
                duplicated = excluded.duplicated,
                conflicted = excluded.conflicted,
                deleted = excluded.deleted,
                synced = excluded.synced
            RETURNING row_id
            "#,
        )
        .bind(item.id().to_string())
        .bind(item.added_at())
        .bind(item.name())
        .bind(state.etag())
        .bind(state.duplicated_slot())
        .bind(state.is_conflicted())
        .bind(state.is_deleted())
        .bind(state.is_synced())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM favorite_tags WHERE favorite_id = ?")
            .bind(item.id().to_string())
            .execute(&mut *tx)
            .await?;

        for tag in item.tags() {
            sqlx::query("INSERT INTO favorite_tags (favorite_id, name, added_at) VALUES (?, ?, ?)")
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

/// Database row representation of a favorite
#[derive(Debug, FromRow)]
struct FavoriteRow {
    row_id: i64,
    id: String,
    added_at: i64,
    name: String,
    etag: Option<String>,
    duplicated: i32,
    conflicted: bool,
    deleted: bool,
    synced: bool,
}

impl FavoriteRow {
    fn into_favorite(self, tags: Vec<Tag>) -> Result<Favorite> {
        let id = FavoriteId::from_string(&self.id).map_err(|e| {
            StoreError::InvalidData(format!("Invalid favorite id {}: {}", self.id, e))
        })?;

        let state = SyncState::from_parts(
            Some(self.row_id),
            self.etag,
            self.duplicated,
            self.conflicted,
            self.deleted,
            self.synced,
        );

        Ok(Favorite::restore(id, self.added_at, self.name, tags, state))
    }
}

const SELECT_COLUMNS: &str =
    "row_id, id, added_at, name, etag, duplicated, conflicted, deleted, synced";

#[async_trait]
impl ItemRepository<Favorite> for SqliteFavoriteRepository {
    async fn get_all(&self) -> Result<Vec<Favorite>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM favorites ORDER BY row_id"
        ))
        .await
    }

    async fn get_unsynced(&self) -> Result<Vec<Favorite>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM favorites WHERE synced = 0 AND conflicted = 0 \
             ORDER BY row_id"
        ))
        .await
    }

    async fn get_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM favorites ORDER BY row_id")
            .fetch_all(&self.pool)
            .await?;

        ids.iter()
            .map(|id| {
                Uuid::parse_str(id).map_err(|e| {
                    StoreError::InvalidData(format!("Invalid favorite id {}: {}", id, e))
                })
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Favorite> {
        let row = sqlx::query_as::<_, FavoriteRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM favorites WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.hydrate(row).await
    }

    async fn save(&self, item: &Favorite) -> Result<i64> {
        self.save_row(item, item.state()).await
    }

    async fn save_duplicated(&self, item: &Favorite) -> Result<i64> {
        let etag = item.state().etag().ok_or_else(|| {
            StoreError::InvalidData("Duplicate save requires a version tag".to_string())
        })?;

        let next_slot: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(duplicated), 0) + 1 FROM favorites WHERE name = ?",
        )
        .bind(item.name())
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "Storing duplicate favorite {} in slot {}",
            item.id(),
            next_slot
        );
        let state = SyncState::duplicated(etag, next_slot as i32);
        self.save_row(item, &state).await
    }

    async fn update_sync_state(&self, id: Uuid, state: &SyncState) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE favorites SET
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
        let result = sqlx::query("DELETE FROM favorites WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn reset_sync_states(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE favorites SET etag = NULL, synced = 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn has_conflicted(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE conflicted = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn has_unsynced(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn get_main(&self, duplicated_key: &str) -> Result<Favorite> {
        let row = sqlx::query_as::<_, FavoriteRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM favorites WHERE name = ? AND duplicated = 0"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::SyncTarget;

    async fn repo() -> SqliteFavoriteRepository {
        SqliteFavoriteRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = repo().await;
        let item = Favorite::new("Reading list", vec![Tag::new("books")]);

        repo.save(&item).await.unwrap();

        let loaded = repo.get(item.id().as_uuid()).await.unwrap();
        assert_eq!(loaded.name(), "Reading list");
        assert_eq!(loaded.tags().len(), 1);
        assert!(item.matches(&loaded));
    }

    #[tokio::test]
    async fn test_conflicting_name_fails_then_duplicates() {
        let repo = repo().await;
        repo.save(&Favorite::new("Reading list", vec![])).await.unwrap();

        let second = Favorite::new("Reading list", vec![])
            .with_state(SyncState::with_etag("e1", SyncTarget::Synced));
        let err = repo.save(&second).await.unwrap_err();
        assert!(err.is_conflict());

        repo.save_duplicated(&second).await.unwrap();
        let loaded = repo.get(second.id().as_uuid()).await.unwrap();
        assert_eq!(loaded.state().duplicated_slot(), 1);
        assert!(loaded.state().is_conflicted());
    }

    #[tokio::test]
    async fn test_get_main_ignores_duplicates() {
        let repo = repo().await;
        let primary = Favorite::new("Reading list", vec![]);
        repo.save(&primary).await.unwrap();

        let dup = Favorite::new("Reading list", vec![])
            .with_state(SyncState::with_etag("e1", SyncTarget::Synced));
        repo.save_duplicated(&dup).await.unwrap();

        let main = repo.get_main("Reading list").await.unwrap();
        assert_eq!(main.id(), primary.id());
    }

    #[tokio::test]
    async fn test_reset_sync_states() {
        let repo = repo().await;
        let item = Favorite::new("Reading list", vec![])
            .with_state(SyncState::with_etag("e", SyncTarget::Synced));
        repo.save(&item).await.unwrap();

        repo.reset_sync_states().await.unwrap();

        let loaded = repo.get(item.id().as_uuid()).await.unwrap();
        assert_eq!(loaded.state().etag(), None);
        assert!(!loaded.state().is_synced());
    }
}
