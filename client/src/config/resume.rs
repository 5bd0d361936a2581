//! Resume cache: the token and received byte count of unfinished downloads, keyed by target.

use anyhow::Context;
use shared::types::{FileId, ResumeToken};
use sqlx::Row;

use super::{Config, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeEntry {
    pub resume_token: ResumeToken,
    /// Bytes of the file already written locally.
    pub offset: u64,
}

/// Cache key of a download, stable across restarts of the client.
pub fn resume_target(server_addr: &str, file_id: FileId) -> String {
    format!("{server_addr}/{file_id}")
}

impl Config {
    pub async fn get_resume(&self, target: &str) -> anyhow::Result<Option<ResumeEntry>> {
        let mut transaction = self.transaction().await?;
        let entry = transaction.get_resume(target).await?;
        transaction.commit().await?;

        Ok(entry)
    }

    pub async fn save_resume(&self, target: &str, token: &str, offset: u64) -> anyhow::Result<()> {
        let mut transaction = self.transaction().await?;
        transaction.save_resume(target, token, offset).await?;
        transaction.commit().await?;

        Ok(())
    }

    pub async fn delete_resume(&self, target: &str) -> anyhow::Result<()> {
        let mut transaction = self.transaction().await?;
        transaction.delete_resume(target).await?;
        transaction.commit().await?;

        Ok(())
    }
}

impl Transaction<'_> {
    pub async fn get_resume(&mut self, target: &str) -> anyhow::Result<Option<ResumeEntry>> {
        let row = sqlx::query("select resume_token, byte_offset from resume where target = ?")
            .bind(target)
            .fetch_optional(&mut self.transaction)
            .await?;

        match row {
            Some(row) => {
                let resume_token: String = row.try_get(0)?;
                let offset: i64 = row.try_get(1)?;

                Ok(Some(ResumeEntry {
                    resume_token,
                    offset: cast::u64(offset).context("negative offset in the resume cache")?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn save_resume(&mut self, target: &str, token: &str, offset: u64) -> anyhow::Result<()> {
        sqlx::query(
            "insert into resume (target, resume_token, byte_offset, updated) values (?, ?, ?, ?)
                on conflict (target) do update set
                    resume_token = excluded.resume_token,
                    byte_offset = excluded.byte_offset,
                    updated = excluded.updated",
        )
        .bind(target)
        .bind(token)
        .bind(cast::i64(offset)?)
        .bind(Config::get_unix_timestamp())
        .execute(&mut self.transaction)
        .await?;

        Ok(())
    }

    pub async fn delete_resume(&mut self, target: &str) -> anyhow::Result<()> {
        sqlx::query("delete from resume where target = ?")
            .bind(target)
            .execute(&mut self.transaction)
            .await?;

        Ok(())
    }
}
