//! Error types for the PHC bus protocol.

use std::io;
use thiserror::Error;

/// Result type alias for PHC operations.
pub type Result<T> = std::result::Result<T, PhcError>;

/// Errors that can occur while talking to PHC modules.
#[derive(Debug, Error)]
pub enum PhcError {
    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// A frame could not be parsed.
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// Description of the framing error.
        reason: String,
    },

    /// The trailing checksum does not match the frame contents.
    #[error("CRC mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    CrcMismatch {
        /// CRC computed over the received bytes.
        expected: u16,
        /// CRC carried by the frame.
        received: u16,
    },

    /// The module type has no outbound command encoding.
    #[error("Module type {module} does not accept commands")]
    UnsupportedModule {
        /// Name of the module type.
        module: String,
    },

    /// The configured serial port does not exist.
    #[error("Serial port '{port}' could not be found, available ports: [{}]", .available.join(", "))]
    PortNotFound {
        /// Configured port name.
        port: String,
        /// Ports reported by the operating system.
        available: Vec<String>,
    },

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PhcError {
    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::PhcError;
    ///
    /// let err = PhcError::invalid_parameter("channel", "must be 0-7");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidFrame` error.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::PhcError;
    ///
    /// let err = PhcError::invalid_frame("frame too short");
    /// ```
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Creates a new `CrcMismatch` error.
    pub fn crc_mismatch(expected: u16, received: u16) -> Self {
        Self::CrcMismatch { expected, received }
    }

    /// Creates a new `UnsupportedModule` error.
    pub fn unsupported_module(module: impl Into<String>) -> Self {
        Self::UnsupportedModule {
            module: module.into(),
        }
    }
}
