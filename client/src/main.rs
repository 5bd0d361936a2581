#![deny(unused_must_use, deprecated)]
#![warn(clippy::pedantic)]
#![allow(clippy::redundant_else, clippy::manual_let_else, clippy::module_name_repetitions)]

use std::{env, path::PathBuf};

use enable_ansi_support::enable_ansi_support;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

mod cli;
mod config;
mod defaults;
mod net;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Windows needs explicit enabling of terminal color escapes support
    enable_ansi_support().ok();

    // diagnostics go to stderr, stdout belongs to the command loop
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::init().await?;

    let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| defaults::server_addr());
    let download_dir = match env::var_os("DOWNLOAD_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir()?,
    };

    cli::run(config, server_addr, download_dir).await
}
