//! Read-modify-write of `.env.local` with a rename commit.
//!
//! The rotated password verifier is persisted here so a restart picks up
//! the new credential. A concurrent reader sees either the old file or the
//! new one, never a partial write.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use ulid::Ulid;

pub const ENV_FILE_NAME: &str = ".env.local";

#[must_use]
pub fn env_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(ENV_FILE_NAME)
}

/// Set `key=value` in the env file, replacing an existing line or
/// appending a new one. Commits by rename.
///
/// # Errors
/// Returns an error when the file cannot be read, written, or renamed.
pub async fn update_var(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err).context("failed to read env file"),
    };

    let updated = replace_line(&existing, key, value);

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .context("failed to create env file directory")?;
    let tmp = parent.join(format!(".tmp-{}", Ulid::new()));
    let result = async {
        fs::write(&tmp, updated.as_bytes())
            .await
            .context("failed to write env file")?;
        fs::rename(&tmp, path)
            .await
            .context("failed to commit env file")
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

fn replace_line(content: &str, key: &str, value: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut replaced = false;
    for line in content.lines() {
        let is_target = line
            .split_once('=')
            .is_some_and(|(name, _)| name.trim() == key);
        if is_target {
            lines.push(format!("{key}={value}"));
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !replaced {
        lines.push(format!("{key}={value}"));
    }
    let mut output = lines.join("\n");
    output.push('\n');
    output
}
