//! Persisted auth token — `spec.md` §6.3.
//!
//! One file per user in a platform-conventional app-data directory, mode
//! 0600 where supported. The core only reads it at startup; `set-token`
//! (the CLI surface, `src/cli.rs`) is the only writer.
//!
//! Grounded on the teacher's `src/ipc/auth.rs::get_or_create_token` —
//! same technique of creating the file with owner-only permissions from
//! the start (via `OpenOptions::mode(0o600)`) to avoid the
//! write-then-chmod TOCTOU window.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const TOKEN_FILENAME: &str = "token";

/// `{data_dir}/token` where `data_dir` is platform-conventional
/// (`$XDG_DATA_HOME/relais-agent` / `~/Library/Application Support/relais-agent`
/// / `%APPDATA%\relais-agent`), matching the teacher's `default_data_dir`.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("relais-agent");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("relais-agent");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("relais-agent");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("relais-agent");
        }
    }
    PathBuf::from(".relais-agent")
}

/// Write `token` to `{data_dir}/token`, creating the file with owner-only
/// permissions from the moment it is created (`set-token`, `spec.md`
/// §6.2).
pub fn write_token(data_dir: &Path, token: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let path = data_dir.join(TOKEN_FILENAME);

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("failed to create token file {}", path.display()))?;
        f.write_all(token.as_bytes())?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(&path, token)
            .with_context(|| format!("failed to write token file {}", path.display()))?;
    }

    Ok(())
}

/// Read the token from `{data_dir}/token`, if present.
pub fn read_token(data_dir: &Path) -> Option<String> {
    let path = data_dir.join(TOKEN_FILENAME);
    let contents = std::fs::read_to_string(path).ok()?;
    let trimmed = contents.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
