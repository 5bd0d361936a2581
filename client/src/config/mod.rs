//! Handles the local client database. Contains the `Transaction` struct that can be used to
//! perform database transactions and has all the necessary methods to access the database.
//! The `Config` struct is used create a `Transaction` and has shorthand methods for most of the
//! same methods in `Transaction`.

pub mod resume;

use std::{
    env,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{anyhow, Context};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use tracing::debug;

use crate::defaults;

#[derive(Clone, Debug)]
pub struct Config {
    db_pool: SqlitePool,
}

pub struct Transaction<'a> {
    transaction: sqlx::Transaction<'a, Sqlite>,
}

impl Config {
    /// Opens the client database at `CLIENT_DB_PATH`, or in the system config folder by default.
    pub async fn init() -> anyhow::Result<Self> {
        let path = match env::var_os("CLIENT_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let mut path =
                    dirs::config_local_dir().ok_or_else(|| anyhow!("Cannot find the system config directory"))?;
                path.push(defaults::APP_FOLDER_NAME);
                path.push(defaults::CONFIG_DB_FILE);
                path
            }
        };

        Self::open(&path).await
    }

    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Unable to write to the config folder {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let db_pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Unable to open a config file at {}", path.display()))?;

        Self::create_db_structure(&db_pool)
            .await
            .context("Failed to create config database structure")?;
        debug!(path = %path.display(), "[db] opened client database");

        Ok(Self { db_pool })
    }

    async fn create_db_structure(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "create table if not exists resume
            (
                    target       text    not null
                        constraint resume_pk
                        primary key,
                    resume_token text    not null,
                    byte_offset  integer not null,
                    updated      integer not null
            );",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn transaction(&self) -> anyhow::Result<Transaction> {
        let transaction = self.db_pool.begin().await?;

        Ok(Transaction { transaction })
    }

    pub fn get_unix_timestamp() -> i64 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        cast::i64(secs).unwrap_or(i64::MAX)
    }
}

impl Transaction<'_> {
    pub async fn commit(self) -> anyhow::Result<()> {
        self.transaction.commit().await?;
        Ok(())
    }
}
