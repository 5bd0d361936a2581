use std::{path::Path, time::Duration};

use async_trait::async_trait;
use shared::types::FileId;
use sqlx::{
    query,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
    Executor, Row, SqlitePool,
};
use tracing::info;

use crate::store::{FileRecord, MetadataStore, ResumeCheckpoint, StoreError};

const SCHEMA_VERSION: &str = "1";

/// SQLite extended result codes for UNIQUE and PRIMARY KEY constraint violations.
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";

#[derive(Clone, Debug)]
pub struct Database {
    conn_pool: SqlitePool,
}

impl Database {
    pub async fn init(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let conn_pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "[db] opened metadata database");

        let db = Self { conn_pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let result = query("select value from metadata where key = 'schema_version'")
            .fetch_optional(&self.conn_pool)
            .await;

        // errors are matched, because the schema might not exist yet
        match result {
            Ok(Some(_)) => Ok(()),
            Err(_) | Ok(None) => {
                info!("[db] creating schema");

                let schema = include_str!("schema/schema.sql");
                (&self.conn_pool).execute(schema).await?;

                query("insert or replace into metadata (key, value) values ('schema_version', ?)")
                    .bind(SCHEMA_VERSION)
                    .execute(&self.conn_pool)
                    .await?;

                Ok(())
            }
        }
    }

    /// Removes resume checkpoints not updated within `max_age`, returns how many were removed.
    pub async fn prune_resume_checkpoints(&self, max_age: Duration) -> Result<u64, StoreError> {
        let result = query("delete from resume where updated_at < datetime('now', ?)")
            .bind(format!("-{} seconds", max_age.as_secs()))
            .execute(&self.conn_pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MetadataStore for Database {
    async fn insert_file(&self, name: &str, size: u64, checksum: Option<&str>) -> Result<FileId, StoreError> {
        let result = query("insert into files (name, size, checksum) values (?, ?, ?)")
            .bind(name)
            .bind(to_db(size)?)
            .bind(checksum)
            .execute(&self.conn_pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateName
                } else {
                    StoreError::Database(e)
                }
            })?;

        Ok(result.last_insert_rowid())
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<FileRecord>, StoreError> {
        let row = query(
            "select file_id, name, size, checksum, uploaded_at, download_count \
             from files where file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.conn_pool)
        .await?;

        Ok(row.as_ref().map(file_from_row).transpose()?)
    }

    async fn list_newest_first(&self, limit: u32) -> Result<Vec<FileRecord>, StoreError> {
        let rows = query(
            "select file_id, name, size, checksum, uploaded_at, download_count \
             from files order by uploaded_at desc, file_id desc limit ?",
        )
        .bind(limit)
        .fetch_all(&self.conn_pool)
        .await?;

        Ok(rows.iter().map(file_from_row).collect::<Result<_, _>>()?)
    }

    async fn update_file_size(&self, file_id: FileId, size: u64) -> Result<(), StoreError> {
        query("update files set size = ? where file_id = ?")
            .bind(to_db(size)?)
            .bind(file_id)
            .execute(&self.conn_pool)
            .await?;

        Ok(())
    }

    async fn increment_download_count(&self, file_id: FileId) -> Result<(), StoreError> {
        query("update files set download_count = download_count + 1 where file_id = ?")
            .bind(file_id)
            .execute(&self.conn_pool)
            .await?;

        Ok(())
    }

    async fn upsert_resume_checkpoint(
        &self,
        token: &str,
        file_id: FileId,
        offset: u64,
        chunk_size: u32,
    ) -> Result<(), StoreError> {
        query(
            "insert into resume (resume_token, file_id, byte_offset, chunk_size) values (?, ?, ?, ?) \
             on conflict (resume_token) do update set \
                file_id = excluded.file_id, \
                byte_offset = excluded.byte_offset, \
                chunk_size = excluded.chunk_size, \
                updated_at = current_timestamp",
        )
        .bind(token)
        .bind(file_id)
        .bind(to_db(offset)?)
        .bind(chunk_size)
        .execute(&self.conn_pool)
        .await?;

        Ok(())
    }

    async fn get_resume_checkpoint(&self, token: &str) -> Result<Option<ResumeCheckpoint>, StoreError> {
        let row = query(
            "select resume_token, file_id, byte_offset, chunk_size, updated_at \
             from resume where resume_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.conn_pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ResumeCheckpoint {
                resume_token: row.try_get(0)?,
                file_id: row.try_get(1)?,
                offset: from_db(row.try_get(2)?),
                chunk_size: row.try_get(3)?,
                timestamp: row.try_get(4)?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_resume_checkpoint(&self, token: &str) -> Result<(), StoreError> {
        query("delete from resume where resume_token = ?")
            .bind(token)
            .execute(&self.conn_pool)
            .await?;

        Ok(())
    }
}

fn file_from_row(row: &SqliteRow) -> Result<FileRecord, sqlx::Error> {
    Ok(FileRecord {
        file_id: row.try_get(0)?,
        name: row.try_get(1)?,
        size: from_db(row.try_get(2)?),
        checksum: row.try_get(3)?,
        uploaded_at: row.try_get(4)?,
        download_count: from_db(row.try_get(5)?),
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(
                db.code().as_deref(),
                Some(SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY)
            ) || db.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}

fn to_db(value: u64) -> Result<i64, StoreError> {
    cast::i64(value).map_err(|_| StoreError::OutOfRange(value))
}

fn from_db(value: i64) -> u64 {
    cast::u64(value).unwrap_or(0)
}
