//! Serial sensor capture.
//!
//! The sensor has no sample counter to poll: it prints one line per sample
//! and the only primitive is a blocking line read. Capture is therefore
//! bounded by wall-clock time instead of a sample budget. Every line is handed
//! to the caller as soon as it is read, so a capture cut short by cancellation
//! still leaves its prefix on disk. The line count is checked afterwards
//! against `rate * duration + 1`.

use std::time::{Duration, Instant};

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::MAX_STARTUP_LINES;
use daq_core::serial::SerialLink;
use daq_core::session::SessionState;
use daq_core::timestamp::RateTimestamper;
use tracing::{debug, info, trace};

/// Discard lines until the sensor prints `startup_line`.
///
/// Returns the number of lines discarded before it. Read timeouts count
/// toward the [`MAX_STARTUP_LINES`] limit so a silent port cannot hold the
/// session forever.
///
/// # Errors
///
/// `PortUnavailable` when the startup line does not appear within the
/// limit, `Cancelled` when the session is cancelled while waiting.
pub fn await_startup<L: SerialLink + ?Sized>(
    link: &mut L,
    startup_line: &str,
    session: &SessionState,
) -> AppResult<usize> {
    for discarded in 0..MAX_STARTUP_LINES {
        session.check_cancelled()?;
        match link.read_line()? {
            Some(line) if line == startup_line => {
                info!(port = link.port_name(), discarded, "Sensor initialized");
                return Ok(discarded);
            }
            Some(line) => trace!(port = link.port_name(), %line, "Discarding boot line"),
            None => trace!(port = link.port_name(), "No line yet"),
        }
    }
    Err(DaqError::PortUnavailable {
        port: link.port_name().to_string(),
        reason: format!("no startup line after {MAX_STARTUP_LINES} reads"),
    })
}

/// Summary of one capture window.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorCapture {
    /// Sample lines delivered, in arrival order
    pub lines: u64,
    /// When the first line arrived
    pub first_line_at: Option<Instant>,
    /// Reads that timed out without a line
    pub timeouts: u64,
}

/// Read sample lines for `duration` of wall-clock time.
///
/// Keeps reading while the clock has not passed `started + duration`;
/// cancellation is checked before every read. A read that times out
/// yields no sample. Each line goes to `on_line` with its zero-based row
/// index before the next read.
///
/// # Errors
///
/// `Cancelled` when the session is cancelled mid-capture; lines already
/// passed to `on_line` stay delivered. Errors from the link or from
/// `on_line` end the capture.
pub fn capture<L, F>(
    link: &mut L,
    duration: Duration,
    session: &SessionState,
    mut on_line: F,
) -> AppResult<SensorCapture>
where
    L: SerialLink + ?Sized,
    F: FnMut(u64, &str) -> AppResult<()>,
{
    let started = Instant::now();
    let deadline = started + duration;
    let mut capture = SensorCapture::default();

    while Instant::now() <= deadline {
        session.check_cancelled()?;
        match link.read_line()? {
            Some(line) => {
                capture.first_line_at.get_or_insert_with(Instant::now);
                on_line(capture.lines, &line)?;
                capture.lines += 1;
            }
            None => capture.timeouts += 1,
        }
    }

    debug!(
        port = link.port_name(),
        lines = capture.lines,
        timeouts = capture.timeouts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Sensor capture finished"
    );
    Ok(capture)
}

/// Check a line count against the count expected for `duration_s` at `rate`.
pub fn check_sample_count(
    lines: u64,
    timestamper: &RateTimestamper,
    duration_s: u32,
) -> AppResult<()> {
    let expected = timestamper.rows_for(duration_s);
    if lines != expected {
        return Err(DaqError::MalformedSampleCount {
            expected: expected as usize,
            actual: lines as usize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::serial::BufReadLink;
    use std::io::Cursor;

    const STARTUP: &str = "One Axis ADS initialization succeeded...";

    fn link(text: &str) -> BufReadLink<Cursor<Vec<u8>>> {
        BufReadLink::new("TEST", Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_await_startup_skips_boot_noise() {
        let session = SessionState::new();
        let mut link = link("garbage\r\nADS found\r\nOne Axis ADS initialization succeeded...\r\n1.00\r\n");
        assert_eq!(await_startup(&mut link, STARTUP, &session).unwrap(), 2);
        assert_eq!(link.read_line().unwrap().as_deref(), Some("1.00"));
    }

    #[test]
    fn test_await_startup_closed_port() {
        let session = SessionState::new();
        let mut link = link("boot\r\n");
        let err = await_startup(&mut link, STARTUP, &session).unwrap_err();
        assert!(err.is_setup_failure());
    }

    #[test]
    fn test_await_startup_silent_port() {
        struct Mute;
        impl SerialLink for Mute {
            fn port_name(&self) -> &str {
                "MUTE"
            }
            fn clear_input(&mut self) -> AppResult<()> {
                Ok(())
            }
            fn read_line(&mut self) -> AppResult<Option<String>> {
                Ok(None)
            }
        }

        let session = SessionState::new();
        match await_startup(&mut Mute, STARTUP, &session) {
            Err(DaqError::PortUnavailable { port, reason }) => {
                assert_eq!(port, "MUTE");
                assert!(reason.contains("startup line"));
            }
            other => panic!("expected PortUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_await_startup_cancelled() {
        let session = SessionState::new();
        session.cancel();
        let mut link = link("One Axis ADS initialization succeeded...\r\n");
        assert!(matches!(
            await_startup(&mut link, STARTUP, &session),
            Err(DaqError::Cancelled)
        ));
    }

    #[test]
    fn test_capture_cancelled_before_read() {
        let session = SessionState::new();
        session.cancel();
        let mut link = link("1.00\r\n");
        assert!(matches!(
            capture(&mut link, Duration::from_millis(50), &session, |_, _| Ok(())),
            Err(DaqError::Cancelled)
        ));
    }

    #[test]
    fn test_capture_stops_at_deadline() {
        struct Silent(u64);
        impl SerialLink for Silent {
            fn port_name(&self) -> &str {
                "SILENT"
            }
            fn clear_input(&mut self) -> AppResult<()> {
                Ok(())
            }
            fn read_line(&mut self) -> AppResult<Option<String>> {
                std::thread::sleep(Duration::from_millis(5));
                self.0 += 1;
                Ok((self.0 % 2 == 0).then(|| format!("{}.00", self.0)))
            }
        }

        let session = SessionState::new();
        let started = Instant::now();
        let mut seen = Vec::new();
        let capture = capture(&mut Silent(0), Duration::from_millis(60), &session, |row, line| {
            seen.push((row, line.to_string()));
            Ok(())
        })
        .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(capture.lines > 0);
        assert_eq!(seen.len() as u64, capture.lines);
        assert!(capture.timeouts > 0);
        assert!(capture.first_line_at.is_some());
        assert!(seen.iter().enumerate().all(|(i, (row, _))| *row == i as u64));
        assert!(seen.iter().all(|(_, l)| l.ends_with(".00")));
    }

    #[test]
    fn test_capture_delivers_lines_before_cancel() {
        struct Ticking<'a> {
            session: &'a SessionState,
            reads: u64,
        }
        impl SerialLink for Ticking<'_> {
            fn port_name(&self) -> &str {
                "TICK"
            }
            fn clear_input(&mut self) -> AppResult<()> {
                Ok(())
            }
            fn read_line(&mut self) -> AppResult<Option<String>> {
                self.reads += 1;
                if self.reads == 5 {
                    self.session.cancel();
                }
                Ok(Some(format!("{}.00", self.reads)))
            }
        }

        let session = SessionState::new();
        let mut delivered = Vec::new();
        let result = capture(
            &mut Ticking {
                session: &session,
                reads: 0,
            },
            Duration::from_secs(5),
            &session,
            |_, line| {
                delivered.push(line.to_string());
                Ok(())
            },
        );
        assert!(matches!(result, Err(DaqError::Cancelled)));
        assert_eq!(delivered, ["1.00", "2.00", "3.00", "4.00", "5.00"]);
    }

    #[test]
    fn test_capture_stops_on_callback_error() {
        let session = SessionState::new();
        let mut link = link("1.00\r\n2.00\r\n3.00\r\n");
        let result = capture(&mut link, Duration::from_secs(5), &session, |row, _| {
            if row == 1 {
                Err(DaqError::Configuration("full".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(DaqError::Configuration(_))));
        assert_eq!(link.read_line().unwrap().as_deref(), Some("3.00"));
    }

    #[test]
    fn test_sample_count_check() {
        let ts = RateTimestamper::new(100);
        assert!(check_sample_count(101, &ts, 1).is_ok());
        assert!(matches!(
            check_sample_count(100, &ts, 1),
            Err(DaqError::MalformedSampleCount {
                expected: 101,
                actual: 100
            })
        ));
    }
}
