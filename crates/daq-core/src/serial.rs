//! Blocking line-oriented serial links.
//!
//! The flex sensor has no out-of-band sample counter; its stream is read by
//! blocking on one text line at a time. This module defines that collaborator
//! seam and a generic implementation over any [`BufRead`].
//!
//! # Feature Flag
//!
//! Opening a real port requires the `serial` feature:
//!
//! ```toml
//! [dependencies]
//! daq-core = { path = "../daq-core", features = ["serial"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_core::serial::{open_serial, SerialLink};
//!
//! let mut link = open_serial("/dev/ttyACM0", 115_200)?;
//! link.clear_input()?;
//! while let Some(line) = link.read_line()? {
//!     println!("{line}");
//! }
//! ```

use std::io::{BufRead, ErrorKind};

use crate::error::{AppResult, DaqError, DriverError, DriverErrorKind};

// =============================================================================
// Serial Link Trait
// =============================================================================

/// A blocking, newline-terminated text link.
pub trait SerialLink: Send {
    /// Port name used in log and error messages.
    fn port_name(&self) -> &str;

    /// Discard anything already buffered on the input side.
    fn clear_input(&mut self) -> AppResult<()>;

    /// Block for the next line.
    ///
    /// Returns the line with trailing whitespace (`\r\n`) removed, or `None`
    /// when the link's read timeout expired before a full line arrived. Bytes
    /// that are not valid UTF-8 are replaced, never rejected.
    fn read_line(&mut self) -> AppResult<Option<String>>;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn clear_input(&mut self) -> AppResult<()> {
        (**self).clear_input()
    }

    fn read_line(&mut self) -> AppResult<Option<String>> {
        (**self).read_line()
    }
}

// =============================================================================
// BufRead Implementation
// =============================================================================

/// [`SerialLink`] over any buffered reader.
///
/// A partial line interrupted by a read timeout is kept and completed by the
/// next call, so timeouts never split a sample.
#[derive(Debug)]
pub struct BufReadLink<R> {
    name: String,
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead + Send> BufReadLink<R> {
    /// Wrap `reader`, naming the link `name`.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
            pending: Vec::with_capacity(64),
        }
    }

    /// Underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    fn closed(&self) -> DaqError {
        DriverError::new(
            "serial",
            DriverErrorKind::Communication,
            format!("Link '{}' closed", self.name),
        )
        .into()
    }
}

impl<R: BufRead + Send> SerialLink for BufReadLink<R> {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.pending.clear();
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Err(self.closed()),
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.pending).trim_end().to_string();
                self.pending.clear();
                Ok(Some(line))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(DaqError::Io(e)),
        }
    }
}

// =============================================================================
// Real Ports
// =============================================================================

/// Link over a real serial port.
#[cfg(feature = "serial")]
pub struct SerialPortLink {
    inner: BufReadLink<std::io::BufReader<Box<dyn serialport::SerialPort>>>,
}

/// Open `port` at `baud` (8N1, no flow control) with the standard read timeout.
///
/// # Errors
///
/// `PortUnavailable` if the OS refuses the port.
#[cfg(feature = "serial")]
pub fn open_serial(port: &str, baud: u32) -> AppResult<SerialPortLink> {
    let handle = serialport::new(port, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(crate::limits::SERIAL_READ_TIMEOUT)
        .open()
        .map_err(|e| DaqError::PortUnavailable {
            port: port.to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!(port, baud, "Opened serial port");
    Ok(SerialPortLink {
        inner: BufReadLink::new(port, std::io::BufReader::new(handle)),
    })
}

#[cfg(feature = "serial")]
impl SerialLink for SerialPortLink {
    fn port_name(&self) -> &str {
        self.inner.port_name()
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.inner.clear_input()?;
        let reader = self.inner.get_mut();
        let buffered = reader.buffer().len();
        reader.consume(buffered);
        reader
            .get_mut()
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| DaqError::PortUnavailable {
                port: self.inner.port_name().to_string(),
                reason: e.to_string(),
            })
    }

    fn read_line(&mut self) -> AppResult<Option<String>> {
        self.inner.read_line()
    }
}
