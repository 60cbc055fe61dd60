//! Streaming CSV sink for drained chunks
//!
//! Writes one row per chunk as chunks arrive: the synthetic timestamp
//! followed by the chunk's channel samples in interleave order. Every row is
//! flushed to the file before the next chunk is accepted, so a session that
//! aborts mid-scan leaves a valid table truncated at the last complete row.
//!
//! # Architecture
//!
//! ```text
//! ChunkDrainer → Chunk { row, timestamp, samples } → CsvSinkWriter → <stem> -- <stream> .csv
//! ```
//!
//! # Example
//!
//! ```no_run
//! use daq_core::source::{Chunk, ChunkSink};
//! use daq_storage::CsvSinkWriter;
//! use std::path::Path;
//!
//! # fn main() -> daq_core::AppResult<()> {
//! let mut writer = CsvSinkWriter::builder()
//!     .output_path(Path::new("data/session -- Chest .csv"))
//!     .labels(["Piezo 0 (V)", "Piezo 1 (V)"])
//!     .create()?;
//!
//! writer.write_chunk(&Chunk { row: 0, timestamp: 0.0, samples: vec![0.1, 0.2] })?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use daq_core::error::{AppResult, DaqError};
use daq_core::source::{Chunk, ChunkSink};
use tracing::{debug, info};

/// Header of the time column in every table this crate writes.
pub const TIME_COLUMN: &str = "Time (s)";

/// Map any storage backend failure onto the session error type.
pub(crate) fn storage_error(path: &Path, err: impl std::fmt::Display) -> DaqError {
    DaqError::Storage {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Write statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Rows written after the header
    pub rows_written: u64,
    /// Samples written across all rows
    pub samples_written: u64,
}

/// Builder for [`CsvSinkWriter`]
#[derive(Debug, Clone)]
pub struct CsvSinkWriterBuilder {
    output_path: PathBuf,
    labels: Vec<String>,
    time_label: String,
    flush_each_row: bool,
}

impl Default for CsvSinkWriterBuilder {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("data.csv"),
            labels: Vec::new(),
            time_label: TIME_COLUMN.to_string(),
            flush_each_row: true,
        }
    }
}

impl CsvSinkWriterBuilder {
    /// Set output file path
    pub fn output_path(mut self, path: &Path) -> Self {
        self.output_path = path.to_path_buf();
        self
    }

    /// Set the column labels, one per sample in a chunk
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Override the time column header
    pub fn time_label(mut self, label: impl Into<String>) -> Self {
        self.time_label = label.into();
        self
    }

    /// Flush after every row (default). Turning this off trades the
    /// truncated-prefix guarantee for fewer syscalls.
    pub fn flush_each_row(mut self, flush: bool) -> Self {
        self.flush_each_row = flush;
        self
    }

    /// Create the file and write the header row.
    ///
    /// # Errors
    ///
    /// `Configuration` when no labels are set, `Storage` when the file
    /// cannot be created or written.
    pub fn create(self) -> AppResult<CsvSinkWriter> {
        if self.labels.is_empty() {
            return Err(DaqError::Configuration(
                "At least one column label must be configured".to_string(),
            ));
        }

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| storage_error(&self.output_path, e))?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .from_path(&self.output_path)
            .map_err(|e| storage_error(&self.output_path, e))?;

        let header = std::iter::once(self.time_label.as_str())
            .chain(self.labels.iter().map(String::as_str));
        writer
            .write_record(header)
            .map_err(|e| storage_error(&self.output_path, e))?;
        writer
            .flush()
            .map_err(|e| storage_error(&self.output_path, e))?;

        info!(
            path = %self.output_path.display(),
            columns = self.labels.len() + 1,
            "CSV sink created"
        );

        Ok(CsvSinkWriter {
            path: self.output_path,
            columns: self.labels.len(),
            flush_each_row: self.flush_each_row,
            writer: Some(writer),
            stats: SinkStats::default(),
        })
    }
}

/// Sequential, headered, row-per-chunk CSV writer.
#[derive(Debug)]
pub struct CsvSinkWriter {
    path: PathBuf,
    columns: usize,
    flush_each_row: bool,
    writer: Option<csv::Writer<File>>,
    stats: SinkStats,
}

impl CsvSinkWriter {
    /// Create a new builder
    pub fn builder() -> CsvSinkWriterBuilder {
        CsvSinkWriterBuilder::default()
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data columns after the time column.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Statistics so far.
    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Append one row of already-formatted cells after the time column.
    ///
    /// Used by streams whose samples arrive as text, such as the serial
    /// sensor, so the value is stored exactly as the device printed it.
    pub fn write_row<S: AsRef<str>>(&mut self, timestamp: f64, cells: &[S]) -> AppResult<()> {
        if cells.len() != self.columns {
            return Err(storage_error(
                &self.path,
                format!("Row has {} cells, table has {} columns", cells.len(), self.columns),
            ));
        }
        let time = timestamp.to_string();
        let record = std::iter::once(time.as_str()).chain(cells.iter().map(|c| c.as_ref()));
        self.append(record, cells.len())
    }

    fn append<'a>(&mut self, record: impl Iterator<Item = &'a str>, samples: usize) -> AppResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| storage_error(&self.path, "Writer already finished"))?;
        writer
            .write_record(record)
            .map_err(|e| storage_error(&self.path, e))?;
        if self.flush_each_row {
            writer.flush().map_err(|e| storage_error(&self.path, e))?;
        }
        self.stats.rows_written += 1;
        self.stats.samples_written += samples as u64;
        Ok(())
    }
}

impl ChunkSink for CsvSinkWriter {
    fn write_chunk(&mut self, chunk: &Chunk) -> AppResult<()> {
        if chunk.len() != self.columns {
            return Err(storage_error(
                &self.path,
                format!(
                    "Chunk {} has {} samples, table has {} columns",
                    chunk.row,
                    chunk.len(),
                    self.columns
                ),
            ));
        }
        let cells: Vec<String> = std::iter::once(chunk.timestamp)
            .chain(chunk.samples.iter().copied())
            .map(|v| v.to_string())
            .collect();
        self.append(cells.iter().map(String::as_str), chunk.len())
    }

    fn finish(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| storage_error(&self.path, e))?;
            debug!(
                path = %self.path.display(),
                rows = self.stats.rows_written,
                "CSV sink finished"
            );
        }
        Ok(())
    }
}
