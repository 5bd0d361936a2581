#![deny(unused_must_use, deprecated)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod acceptor;
mod blob;
mod config;
mod db;
mod error;
mod session;
mod store;
mod transfer;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{acceptor::Acceptor, blob::FsBlobStore, config::ServerConfig, db::Database, store::Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        storage_dir = %config.storage_dir.display(),
        db_path = %config.db_path.display(),
        max_sessions = config.max_sessions,
        idle_timeout = ?config.idle_timeout,
        "starting file server"
    );

    let blobs = FsBlobStore::new(&config.storage_dir)
        .await
        .with_context(|| format!("cannot open storage directory {}", config.storage_dir.display()))?;
    let db = Database::init(&config.db_path)
        .await
        .with_context(|| format!("cannot open metadata database {}", config.db_path.display()))?;

    let pruned = db
        .prune_resume_checkpoints(config.checkpoint_max_age)
        .await
        .context("cannot prune resume checkpoints")?;
    info!(pruned, max_age = ?config.checkpoint_max_age, "[db] pruned stale resume checkpoints");

    let acceptor = Acceptor::bind(
        config.bind_addr.as_str(),
        Stores::new(db, blobs),
        (&config).into(),
        config.max_sessions,
    )
    .await
    .with_context(|| format!("cannot listen on {}", config.bind_addr))?;
    info!(addr = %acceptor.local_addr()?, "[net] listening");

    tokio::select! {
        () = acceptor.run() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("cannot listen for shutdown signal")?;
            info!("shutting down");
        }
    }

    Ok(())
}
