//! Plain-text transcript export.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::config::data::path_display;
use crate::core::session::Session;

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug)]
pub enum ExportError {
    /// The session has no messages; nothing is written.
    Empty,
    /// The target exists and overwriting was not requested.
    Exists(PathBuf),
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Empty => write!(f, "Nothing to export: the chat has no messages"),
            ExportError::Exists(path) => write!(f, "{} already exists", path_display(path)),
            ExportError::Io { path, source } => {
                write!(f, "Failed to write {}: {}", path_display(path), source)
            }
        }
    }
}

impl StdError for ExportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ExportError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// `ROLE:\ncontent` blocks joined by a horizontal rule.
pub fn export_transcript(session: &Session) -> String {
    session
        .messages
        .iter()
        .map(|message| format!("{}:\n{}", message.role.export_label(), message.content))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// File name derived from a chat title. Spaces, path separators and other
/// characters reserved by common filesystems become underscores, and leading
/// dots are dropped, so the name always stays inside the export directory.
pub fn export_filename(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "chat.txt".to_string()
    } else {
        format!("{stem}.txt")
    }
}

pub fn write_export(
    session: &Session,
    dir: &Path,
    overwrite: bool,
) -> Result<PathBuf, ExportError> {
    if session.is_empty() {
        return Err(ExportError::Empty);
    }

    let path = dir.join(export_filename(&session.title));
    if path.exists() && !overwrite {
        return Err(ExportError::Exists(path));
    }

    fs::write(&path, export_transcript(session)).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
