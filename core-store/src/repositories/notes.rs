//! Note repository

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{LinkId, Note, NoteId, SyncState, Tag};
use crate::repositories::ItemRepository;

/// SQLite implementation of the note collection adapter
pub struct SqliteNoteRepository {
    pool: SqlitePool,
}

impl SqliteNoteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_tags(&self, id: &str) -> Result<Vec<Tag>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, added_at FROM note_tags WHERE note_id = ? ORDER BY added_at, name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, added_at)| Tag::with_added(name, added_at))
            .collect())
    }

    async fn hydrate(&self, row: NoteRow) -> Result<Note> {
        let tags = self.load_tags(&row.id).await?;
        row.into_note(tags)
    }

    async fn fetch_many(&self, query: &str) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(query)
            .fetch_all(&self.pool)
            .await?;

        let mut notes = Vec::with_capacity(rows.len());
        for row in rows {
            notes.push(self.hydrate(row).await?);
        }
        Ok(notes)
    }

    async fn save_row(&self, item: &Note, state: &SyncState) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let row_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notes (
                id, created_at, updated_at, excerpt, link_id,
                etag, duplicated, conflicted, deleted, synced
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                excerpt = excluded.excerpt,
                link_id = excluded.link_id,
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
        .bind(item.excerpt())
        .bind(item.link_id().map(|id| id.to_string()))
        .bind(state.etag())
        .bind(state.duplicated_slot())
        .bind(state.is_conflicted())
        .bind(state.is_deleted())
        .bind(state.is_synced())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM note_tags WHERE note_id = ?")
            .bind(item.id().to_string())
            .execute(&mut *tx)
            .await?;

        for tag in item.tags() {
            sqlx::query("INSERT INTO note_tags (note_id, name, added_at) VALUES (?, ?, ?)")
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

/// Database row representation of a note
#[derive(Debug, FromRow)]
struct NoteRow {
    row_id: i64,
    id: String,
    created_at: i64,
    updated_at: i64,
    excerpt: String,
    link_id: Option<String>,
    etag: Option<String>,
    duplicated: i32,
    conflicted: bool,
    deleted: bool,
    synced: bool,
}

impl NoteRow {
    fn into_note(self, tags: Vec<Tag>) -> Result<Note> {
        let id = NoteId::from_string(&self.id)
            .map_err(|e| StoreError::InvalidData(format!("Invalid note id {}: {}", self.id, e)))?;

        let link_id = self
            .link_id
            .as_deref()
            .map(LinkId::from_string)
            .transpose()
            .map_err(|e| StoreError::InvalidData(format!("Invalid note link id: {}", e)))?;

        let state = SyncState::from_parts(
            Some(self.row_id),
            self.etag,
            self.duplicated,
            self.conflicted,
            self.deleted,
            self.synced,
        );

        Ok(Note::restore(
            id,
            self.created_at,
            self.updated_at,
            self.excerpt,
            link_id,
            tags,
            state,
        ))
    }
}

const SELECT_COLUMNS: &str = "row_id, id, created_at, updated_at, excerpt, link_id, \
                              etag, duplicated, conflicted, deleted, synced";

#[async_trait]
impl ItemRepository<Note> for SqliteNoteRepository {
    async fn get_all(&self) -> Result<Vec<Note>> {
        self.fetch_many(&format!("SELECT {SELECT_COLUMNS} FROM notes ORDER BY row_id"))
            .await
    }

    async fn get_unsynced(&self) -> Result<Vec<Note>> {
        self.fetch_many(&format!(
            "SELECT {SELECT_COLUMNS} FROM notes WHERE synced = 0 AND conflicted = 0 ORDER BY row_id"
        ))
        .await
    }

    async fn get_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM notes ORDER BY row_id")
            .fetch_all(&self.pool)
            .await?;

        ids.iter()
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|e| StoreError::InvalidData(format!("Invalid note id {}: {}", id, e)))
            })
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Note> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM notes WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.hydrate(row).await
    }

    async fn save(&self, item: &Note) -> Result<i64> {
        self.save_row(item, item.state()).await
    }

    async fn save_duplicated(&self, item: &Note) -> Result<i64> {
        let etag = item.state().etag().ok_or_else(|| {
            StoreError::InvalidData("Duplicate save requires a version tag".to_string())
        })?;

        let next_slot: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(duplicated), 0) + 1 FROM notes WHERE excerpt = ?",
        )
        .bind(item.excerpt())
        .fetch_one(&self.pool)
        .await?;

        debug!("Storing duplicate note {} in slot {}", item.id(), next_slot);
        let state = SyncState::duplicated(etag, next_slot as i32);
        self.save_row(item, &state).await
    }

    async fn update_sync_state(&self, id: Uuid, state: &SyncState) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET
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
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn reset_sync_states(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE notes SET etag = NULL, synced = 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn has_conflicted(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE conflicted = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn has_unsynced(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn get_main(&self, duplicated_key: &str) -> Result<Note> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM notes WHERE excerpt = ? AND duplicated = 0"
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
