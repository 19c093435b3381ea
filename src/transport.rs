//! Serial transport for the PHC bus.
//!
//! This module only moves bytes. It knows nothing about frames beyond
//! writing one buffer per call.
//!
//! The bus runs at 19200 baud, 8 data bits, no parity, 2 stop bits, no flow
//! control. RTS is held high while listening and dropped while a frame is
//! being written.
//!
//! # Example
//!
//! ```no_run
//! use phc_serial::{BridgeConfig, FrameWriter, SerialTransport};
//!
//! let transport = SerialTransport::open(&BridgeConfig::new("/dev/ttyUSB0"))?;
//! let (mut writer, mut reader) = transport.split()?;
//!
//! writer.write_frame(&[0xFF, 0x01, 0x00, 0xE7, 0x19])?;
//!
//! let mut buffer = [0u8; 64];
//! let n = reader.read(&mut buffer)?;
//! # Ok::<(), phc_serial::PhcError>(())
//! ```

use std::io::{self, Read, Write};

use log::{debug, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::BridgeConfig;
use crate::error::{PhcError, Result};

/// Sink for encoded frames.
///
/// Implemented by [`SerialWriter`]; tests plug in in-memory writers.
pub trait FrameWriter: Send {
    /// Writes one complete frame.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Serial port opened with the PHC line settings.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Opens and configures the port named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::PortNotFound` if the port does not exist and
    /// `PhcError::Serial` if it cannot be opened or configured.
    pub fn open(config: &BridgeConfig) -> Result<Self> {
        let opened = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open();

        let mut port = match opened {
            Ok(port) => port,
            Err(e) if is_missing(&e) => {
                return Err(PhcError::PortNotFound {
                    port: config.port.clone(),
                    available: available_ports(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        port.write_request_to_send(true)?;
        debug!("Serial port '{}' opened at {} baud", config.port, config.baud_rate);

        Ok(Self {
            port,
            name: config.port.clone(),
        })
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Splits the port into a writer and a reader sharing the device.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::Serial` if the handle cannot be cloned.
    pub fn split(self) -> Result<(SerialWriter, SerialReader)> {
        let reader = self.port.try_clone()?;
        Ok((
            SerialWriter {
                port: self.port,
                name: self.name.clone(),
            },
            SerialReader {
                port: reader,
                name: self.name,
            },
        ))
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

/// Writing half of a [`SerialTransport`].
pub struct SerialWriter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl FrameWriter for SerialWriter {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_request_to_send(false).map_err(io::Error::from)?;

        let written = self.port.write_all(frame).and_then(|()| self.port.flush());

        if let Err(e) = self.port.write_request_to_send(true) {
            warn!("Could not raise RTS on '{}': {}", self.name, e);
        }
        written
    }
}

impl std::fmt::Debug for SerialWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWriter").field("name", &self.name).finish()
    }
}

/// Reading half of a [`SerialTransport`].
pub struct SerialReader {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialReader {
    /// Reads whatever is available. A read timeout yields `Ok(0)`.
    pub fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for SerialReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialReader").field("name", &self.name).finish()
    }
}

fn is_missing(error: &serialport::Error) -> bool {
    matches!(
        error.kind(),
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
    )
}

/// Names of the serial ports the operating system reports.
pub fn available_ports() -> Vec<String> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port() {
        let config = BridgeConfig::new("/dev/phc-serial-does-not-exist");
        let err = SerialTransport::open(&config).unwrap_err();
        assert!(
            matches!(err, PhcError::PortNotFound { ref port, .. } if port == "/dev/phc-serial-does-not-exist"),
            "{err}"
        );
    }

    #[test]
    fn test_is_missing() {
        assert!(is_missing(&serialport::Error::new(
            serialport::ErrorKind::NoDevice,
            "no device"
        )));
        assert!(!is_missing(&serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            "bad"
        )));
    }
}
