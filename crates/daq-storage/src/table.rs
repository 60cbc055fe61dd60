//! In-memory column tables for post-session reshaping.
//!
//! Stream files are small compared to the ring traffic that produced them
//! (one row per scan), so the merge and split steps read whole tables, build
//! the result in memory and write it back in one pass. Cells are kept as the
//! text that was written, so a reshaped file carries values byte-for-byte.

use std::path::Path;

use daq_core::error::AppResult;
use tracing::debug;

use crate::csv_sink::storage_error;

/// Cell written where a column has no value at a row.
///
/// Distinct from `0` and from a missing column: the row keeps its full width.
pub const BLANK: &str = "";

/// A headered table of text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Empty table with the given headers.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a CSV file with a header row.
    ///
    /// Short rows (a file truncated mid-record) are padded with blanks.
    pub fn read(path: &Path) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| storage_error(path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| storage_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| storage_error(path, e))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), BLANK.to_string());
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), columns = headers.len(), "Table read");
        Ok(Self { headers, rows })
    }

    /// Write the table as CSV, replacing any existing file.
    pub fn write(&self, path: &Path) -> AppResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .from_path(path)
            .map_err(|e| storage_error(path, e))?;
        writer
            .write_record(&self.headers)
            .map_err(|e| storage_error(path, e))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| storage_error(path, e))?;
        }
        writer.flush().map_err(|e| storage_error(path, e))?;
        debug!(path = %path.display(), rows = self.rows.len(), "Table written");
        Ok(())
    }

    /// Column headers.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `row`, `column`; `None` outside the table.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Append a row. Rows shorter than the header are padded with blanks.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), BLANK.to_string());
        self.rows.push(row);
    }

    /// New table holding only the named columns, in the order given.
    ///
    /// Returns `None` if any name is not a column of this table.
    pub fn select(&self, names: &[&str]) -> Option<Table> {
        let indices: Vec<usize> = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Option<_>>()?;
        Some(self.project(&indices))
    }

    /// New table without the named columns. Unknown names are ignored.
    pub fn without(&self, names: &[&str]) -> Table {
        let indices: Vec<usize> = (0..self.headers.len())
            .filter(|&i| !names.contains(&self.headers[i].as_str()))
            .collect();
        self.project(&indices)
    }

    fn project(&self, indices: &[usize]) -> Table {
        Table {
            headers: indices.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Table {
        let mut table = Table::new(["Time (s)", "A", "B", "C"]);
        table.push_row(vec!["0".into(), "1".into(), "2".into(), "3".into()]);
        table.push_row(vec!["0.001".into(), "4".into(), "5".into(), "6".into()]);
        table
    }

    #[test]
    fn test_select_reorders() {
        let t = sample().select(&["Time (s)", "C", "A"]).unwrap();
        assert_eq!(t.headers(), ["Time (s)", "C", "A"]);
        assert_eq!(t.cell(1, 1), Some("6"));
        assert!(sample().select(&["Missing"]).is_none());
    }

    #[test]
    fn test_without() {
        let t = sample().without(&["B", "Nope"]);
        assert_eq!(t.headers(), ["Time (s)", "A", "C"]);
        assert_eq!(t.rows()[0], vec!["0", "1", "3"]);
    }

    #[test]
    fn test_push_row_pads_with_blank() {
        let mut t = Table::new(["Time (s)", "A"]);
        t.push_row(vec!["0".into()]);
        assert_eq!(t.cell(0, 1), Some(BLANK));
        assert_eq!(t.cell(5, 0), None);
    }

    #[test]
    fn test_blank_cells_survive_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let mut t = Table::new(["Time (s)", "A", "S"]);
        t.push_row(vec!["0".into(), "1".into(), "9.5".into()]);
        t.push_row(vec!["0.001".into(), "2".into(), BLANK.into()]);
        t.write(&path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Time (s),A,S\n0,1,9.5\n0.001,2,\n"
        );
        let back = Table::read(&path).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_read_truncated_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.csv");
        std::fs::write(&path, "Time (s),A,B\n0,1,2\n0.001,3").unwrap();
        let t = Table::read(&path).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, 2), Some(BLANK));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Table::read(&dir.path().join("none.csv")).is_err());
    }
}
