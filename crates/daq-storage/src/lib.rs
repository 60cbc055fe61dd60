//! Session output for daq-scan.
//!
//! - [`CsvSinkWriter`]: streaming, row-per-chunk sink used by every stream
//! - [`Table`]: whole-file tables for the post-session merge and split
//! - [`SessionNaming`]: shared file stem and per-part paths

pub mod csv_sink;
pub mod naming;
pub mod table;

pub use csv_sink::{CsvSinkWriter, CsvSinkWriterBuilder, SinkStats, TIME_COLUMN};
pub use naming::SessionNaming;
pub use table::{Table, BLANK};
