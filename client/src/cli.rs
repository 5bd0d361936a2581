//! Implements the interactive command loop.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use dialoguer::{theme::ColorfulTheme, Input};
use human_bytes::human_bytes;
use owo_colors::OwoColorize;
use shared::types::FileId;
use tracing::debug;

use crate::{
    config::{resume::resume_target, Config},
    net::{Connection, DownloadOutcome, RequestError},
};

const HELP: &str = "commands: ping | list [path] | get <file_id> | put <path> | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    List(String),
    Get(FileId),
    Put(PathBuf),
    Quit,
}

impl Command {
    /// Parses one input line. Returns `Ok(None)` for a blank line and a hint for invalid input.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "ping" => Command::Ping,
            "list" | "ls" => Command::List(arg.to_string()),
            "get" => match arg.parse() {
                Ok(file_id) => Command::Get(file_id),
                Err(_) => return Err("usage: get <file_id>".to_string()),
            },
            "put" if !arg.is_empty() => Command::Put(PathBuf::from(arg)),
            "put" => return Err("usage: put <path>".to_string()),
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', {HELP}")),
        };

        Ok(Some(command))
    }
}

/// Reads commands until the user quits, connecting to the server on first use and again after
/// a failure broke the connection.
pub async fn run(config: Config, server_addr: String, download_dir: PathBuf) -> anyhow::Result<()> {
    println!("{} {}", "File server:".green(), server_addr.bold());
    println!("{}", HELP.bright_black());

    let mut connection: Option<Connection> = None;
    loop {
        let Some(line) = prompt().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(hint) => {
                println!("{}", hint.yellow());
                continue;
            }
        };

        if connection.is_none() {
            match Connection::connect(&server_addr).await {
                Ok(conn) => connection = Some(conn),
                Err(e) => {
                    println!("{} {e:#}", "Cannot connect to the server:".red());
                    continue;
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        if let Err(e) = execute(conn, &config, &download_dir, command).await {
            println!("{} {e:#}", "Error:".red().bold());

            let keeps_connection = e
                .downcast_ref::<RequestError>()
                .map_or(false, RequestError::keeps_connection);
            if !keeps_connection {
                debug!("[net] dropping connection after failure");
                connection = None;
            }
        }
    }

    Ok(())
}

async fn prompt() -> anyhow::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("ftp")
            .allow_empty(true)
            .interact_text()
    })
    .await?;

    match line {
        Ok(line) => Ok(Some(line)),
        Err(e) => {
            // closed input, e.g. Ctrl-D
            debug!(error = %e, "input ended");
            Ok(None)
        }
    }
}

/// Redraws a single status line with the transferred and total size.
fn show_progress(label: &str, done: u64, total: u64) {
    print!(
        "\r{} {} / {}",
        label.cyan(),
        human_bytes(cast::f64(done)),
        human_bytes(cast::f64(total))
    );
    std::io::stdout().flush().ok();

    if done == total {
        println!();
    }
}

async fn execute(
    conn: &mut Connection,
    config: &Config,
    download_dir: &Path,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Ping => {
            let reply = conn.ping().await?;
            println!("{} {reply}", "Server replied:".green());
        }
        Command::List(path) => {
            println!("{}", conn.list(&path).await?);
        }
        Command::Get(file_id) => {
            if let Some(entry) = config
                .get_resume(&resume_target(conn.server_addr(), file_id))
                .await?
            {
                println!("{} {}", "Resuming after".cyan(), human_bytes(cast::f64(entry.offset)));
            }

            let progress = |received, size| show_progress("Downloading", received, size);
            match conn.get(config, file_id, download_dir, progress).await? {
                DownloadOutcome::Complete { path, size, .. } => {
                    println!(
                        "{} {} ({})",
                        "Saved".green(),
                        path.display(),
                        human_bytes(cast::f64(size))
                    );
                }
                DownloadOutcome::Restart {
                    server_offset,
                    local_len,
                } => {
                    println!(
                        "{}",
                        format!(
                            "The server continued at byte {server_offset}, but only {local_len} bytes are stored \
                             locally. The partial download was discarded, run the command again to start over."
                        )
                        .yellow()
                    );
                }
            }
        }
        Command::Put(path) => {
            let size = conn
                .put(&path, |sent, size| show_progress("Uploading", sent, size))
                .await?;
            println!("{} {} ({})", "Uploaded".green(), path.display(), human_bytes(cast::f64(size)));
        }
        Command::Quit => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("ping"), Ok(Some(Command::Ping)));
        assert_eq!(Command::parse("  LIST  "), Ok(Some(Command::List(String::new()))));
        assert_eq!(Command::parse("list /docs"), Ok(Some(Command::List("/docs".to_string()))));
        assert_eq!(Command::parse("get 12"), Ok(Some(Command::Get(12))));
        assert_eq!(
            Command::parse("put my files/report.txt"),
            Ok(Some(Command::Put(PathBuf::from("my files/report.txt"))))
        );
        assert_eq!(Command::parse("exit"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("quit"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn invalid_input_gives_hint() {
        assert!(Command::parse("get").unwrap_err().starts_with("usage"));
        assert!(Command::parse("get abc").is_err());
        assert!(Command::parse("put").is_err());
        assert!(Command::parse("delete 1").unwrap_err().contains("unknown command 'delete'"));
    }
}
