//! Non-interactive execution of command files.
//!
//! Each line of the file is one server command, run in order, with the
//! response printed to stdout. Blank lines are separators, not commands;
//! they are never sent. There is no retry here: a lost connection aborts
//! the rest of the file so a half-applied script is noticed instead of
//! silently resumed against a restarted server.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::proto::Connection;

/// Run every non-blank line of `path` as a server command.
pub async fn run_file(conn: &mut Connection, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    for command in content.lines() {
        let command = command.trim();
        if command.is_empty() {
            continue;
        }
        debug!("running {:?}", command);
        let response = conn
            .send(command)
            .await
            .with_context(|| format!("while running {}", path.display()))?;
        println!("{}", response);
    }
    Ok(())
}
