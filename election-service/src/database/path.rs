use anyhow::{bail, Result};
use std::{
    fs,
    path::{Component, Path},
};

/// Validate a filesystem path before it is turned into a `sqlite://` URL.
pub fn validate_db_path(db_path: &str) -> Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }

    if db_path.trim().is_empty() {
        bail!("Empty database path");
    }

    if db_path.contains(['\0', '\n', '\r', '\t']) {
        bail!("Invalid control characters in database path");
    }

    // The path is embedded in a connection URL; a query string would smuggle options in.
    if db_path.contains('?') || db_path.contains('#') || db_path.starts_with("sqlite:") {
        bail!("Database path must be a plain file path, not a URL");
    }

    let path = Path::new(db_path);

    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        bail!("Parent directory traversal is not allowed in database path");
    }

    if path.file_name().is_none() {
        bail!("Database path must include a file name");
    }

    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            bail!("Symlink path is not allowed for database path");
        }
        if meta.is_dir() {
            bail!("Database path points to a directory");
        }
    }

    Ok(())
}
