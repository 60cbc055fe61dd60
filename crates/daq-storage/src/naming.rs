//! Session file naming.
//!
//! Every file of a session shares one stem,
//! `<YYYY-MM-DD HH;MM> -- <subject> -- <rate>Hz for <duration>s`, taken once
//! when the session starts. Semicolons stand in for colons so the names are
//! valid on Windows.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use daq_core::config::file_part;

/// Timestamp format of the stem prefix.
pub const STEM_TIME_FORMAT: &str = "%Y-%m-%d %H;%M";

/// Paths of every file a session writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionNaming {
    output_dir: PathBuf,
    stem: String,
}

impl SessionNaming {
    /// Naming for a session started now.
    pub fn now(output_dir: &Path, subject: &str, rate_hz: u32, duration_s: u32) -> Self {
        Self::at(&Local::now(), output_dir, subject, rate_hz, duration_s)
    }

    /// Naming for a session started at `started`.
    pub fn at<Tz: TimeZone>(
        started: &DateTime<Tz>,
        output_dir: &Path,
        subject: &str,
        rate_hz: u32,
        duration_s: u32,
    ) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let stem = format!(
            "{} -- {} -- {}Hz for {}s",
            started.format(STEM_TIME_FORMAT),
            file_part(subject),
            rate_hz,
            duration_s
        );
        Self {
            output_dir: output_dir.to_path_buf(),
            stem,
        }
    }

    /// Shared stem.
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Directory holding the session files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Single merged table, `<stem> .csv`.
    pub fn merged_file(&self) -> PathBuf {
        self.output_dir.join(format!("{} .csv", self.stem))
    }

    /// Per-stream or per-column-group table, `<stem> -- <part> .csv`.
    ///
    /// Names that agree after [`file_part`] map to the same file.
    pub fn part_file(&self, part: &str) -> PathBuf {
        self.output_dir
            .join(format!("{} -- {} .csv", self.stem, file_part(part)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed() -> SessionNaming {
        let started = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 42).unwrap();
        SessionNaming::at(&started, Path::new("/data"), "Jane Doe (F)", 1000, 10)
    }

    #[test]
    fn test_stem_format() {
        assert_eq!(fixed().stem(), "2024-03-07 09;05 -- Jane Doe (F) -- 1000Hz for 10s");
    }

    #[test]
    fn test_file_names() {
        let naming = fixed();
        assert_eq!(
            naming.merged_file(),
            Path::new("/data/2024-03-07 09;05 -- Jane Doe (F) -- 1000Hz for 10s .csv")
        );
        assert_eq!(
            naming.part_file("Flex Sensor"),
            Path::new("/data/2024-03-07 09;05 -- Jane Doe (F) -- 1000Hz for 10s -- Flex Sensor .csv")
        );
    }

    #[test]
    fn test_sanitizes_subject() {
        let started = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let naming = SessionNaming::at(&started, Path::new("."), " a/b:c ", 500, 1);
        assert_eq!(naming.stem(), "2024-01-01 00;00 -- a_b_c -- 500Hz for 1s");
    }
}
