//! CSV tables
//!
//! Typed tables (catalog, long table, QA summary) go through serde. Wide panels
//! have data-dependent columns and are written as string grids.

use csv::{ReaderBuilder, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::marker::PhantomData;
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, OutputWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Streaming CSV writer for one record type
pub struct CsvRecordWriter<T: Serialize> {
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
    _record: PhantomData<T>,
}

impl<T: Serialize> CsvRecordWriter<T> {
    /// Create the file, and its parent directory, at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        debug!("Creating CSV writer: path={}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    OutputError::IoError(format!("Failed to create directory: {e}"))
                })?;
            }
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);

        Ok(Self {
            writer: Writer::from_writer(buf_writer),
            rows_written: 0,
            _record: PhantomData,
        })
    }

    /// Append one record; the header is written before the first one
    pub fn write_record(&mut self, record: &T) -> OutputResult<()> {
        self.writer
            .serialize(record)
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Records written so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl<T: Serialize> OutputWriter for CsvRecordWriter<T> {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        debug!(rows = self.rows_written, "CSV writer closed");
        Ok(())
    }
}

/// Write `records` to `path`, header first.
///
/// `header` is written explicitly so that an empty table still has its columns.
pub fn write_records<T: Serialize>(
    path: &Path,
    header: &[&str],
    records: &[T],
) -> OutputResult<u64> {
    if records.is_empty() {
        write_table(
            path,
            &header.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
            &[],
        )?;
        return Ok(0);
    }

    let mut writer = CsvRecordWriter::new(path)?;
    for record in records {
        writer.write_record(record)?;
    }
    let rows = writer.rows_written();
    writer.close()?;
    info!(path = %path.display(), rows, "Wrote CSV");
    Ok(rows)
}

/// Read every record of `path`
pub fn read_records<T: DeserializeOwned>(path: &Path) -> OutputResult<Vec<T>> {
    if !path.exists() {
        return Err(OutputError::NotFound(path.display().to_string()));
    }
    let mut reader = ReaderBuilder::new()
        .from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to open {}: {e}", path.display())))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| OutputError::CsvError(format!("Failed to read {}: {e}", path.display())))
}

/// Write a string grid with the given header
pub fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> OutputResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }
    }
    let mut writer = Writer::from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to create {}: {e}", path.display())))?;
    writer
        .write_record(header)
        .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
    info!(path = %path.display(), rows = rows.len(), columns = header.len(), "Wrote CSV");
    Ok(())
}
