//! Output layout and persistence
//!
//! - [`path`] - Raw archive layout, processed file names, path sanitising
//! - [`csv`] - Typed and dynamic CSV tables

use std::io::Write;
use std::path::Path;

pub mod csv;
pub mod path;

pub use path::{parse_window_from_filename, sanitize_component, RawPathBuilder};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),

    /// Expected input file is absent
    #[error("file not found: {0}")]
    NotFound(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Common behaviour of streaming writers
pub trait OutputWriter {
    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;

    /// Close the writer and finalize output
    fn close(self) -> OutputResult<()>;
}

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// Readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| {
        OutputError::IoError(format!(
            "Failed to create directory {}: {e}",
            parent_dir.display()
        ))
    })?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(bytes)
        .map_err(|e| OutputError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| OutputError::FlushError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| OutputError::IoError(format!("Failed to persist {}: {e}", path.display())))?;
    Ok(())
}

/// Write `text` to `path`, creating parent directories
pub fn write_text(path: &Path, text: &str) -> OutputResult<()> {
    write_atomic(path, text.as_bytes())
}

/// Serialize `value` as pretty JSON with a trailing newline
pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> OutputResult<()> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| OutputError::SerializationError(e.to_string()))?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}
