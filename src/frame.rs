//! PHC frame encoding and stream reassembly.
//!
//! # Frame Structure
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0 | ADDR | Module bus address |
//! | 1 | SIZE | Payload length (bits 0-6), toggle flag (bit 7) |
//! | 2.. | DATA | Payload |
//! | n-2 | CRC-L | Checksum low byte |
//! | n-1 | CRC-H | Checksum high byte |
//!
//! The serial driver hands over whatever happens to be in the receive buffer,
//! so a frame may be split across several reads. [`FrameDecoder`] keeps the
//! unfinished tail of one read and continues with the next.
//!
//! # Example
//!
//! ```
//! use phc_serial::{Frame, FrameDecoder, ModuleRegistry, ModuleType};
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(ModuleType::Am, 3).unwrap();
//!
//! let frame = Frame::new(0x43, vec![0x00, 0x04], false).unwrap();
//! let bytes = frame.to_bytes();
//!
//! let mut decoder = FrameDecoder::new();
//! assert!(decoder.feed(&bytes[..3], &registry).is_empty());
//! assert_eq!(decoder.feed(&bytes[3..], &registry), vec![frame]);
//! ```

use std::collections::HashSet;

use log::{debug, trace};

use crate::crc::crc16;
use crate::error::{PhcError, Result};
use crate::module::ModuleRegistry;
use crate::utils::format_frame;

/// Address, size and two CRC bytes.
pub const FRAME_OVERHEAD: usize = 4;

/// Toggle flag in the size byte.
pub const TOGGLE_BIT: u8 = 0x80;

/// Payload length bits of the size byte.
pub const SIZE_MASK: u8 = 0x7F;

/// Largest payload the size byte can describe.
pub const MAX_PAYLOAD_SIZE: usize = SIZE_MASK as usize;

/// Largest payload the decoder accepts from modules.
pub const MAX_DECODED_PAYLOAD: usize = 3;

/// A single frame on the PHC bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Module bus address.
    pub address: u8,
    /// Toggle flag distinguishing a new transaction from a retransmission.
    pub toggle: bool,
    /// Command bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if the payload is longer than
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn new(address: u8, payload: impl Into<Vec<u8>>, toggle: bool) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PhcError::invalid_parameter(
                "payload",
                format!("must not exceed {} bytes", MAX_PAYLOAD_SIZE),
            ));
        }
        Ok(Self {
            address,
            toggle,
            payload,
        })
    }

    /// Size byte as transmitted, toggle flag included.
    ///
    /// The payload must not exceed [`MAX_PAYLOAD_SIZE`]; frames built with
    /// [`Frame::new`] never do.
    pub fn size_byte(&self) -> u8 {
        debug_assert!(
            self.payload.len() <= MAX_PAYLOAD_SIZE,
            "payload of {} bytes does not fit the size byte",
            self.payload.len()
        );
        let len = (self.payload.len() & MAX_PAYLOAD_SIZE) as u8;
        if self.toggle {
            len | TOGGLE_BIT
        } else {
            len
        }
    }

    /// Checksum over address, size byte and payload.
    pub fn crc(&self) -> u16 {
        let mut header = Vec::with_capacity(2 + self.payload.len());
        header.push(self.address);
        header.push(self.size_byte());
        header.extend_from_slice(&self.payload);
        crc16(&header)
    }

    /// Total length on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Serializes the frame, checksum appended low byte first.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::Frame;
    ///
    /// let frame = Frame::new(0x43, vec![0x42], false).unwrap();
    /// assert_eq!(frame.to_bytes(), vec![0x43, 0x01, 0x42, 0x10, 0x57]);
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.encoded_len());
        buffer.push(self.address);
        buffer.push(self.size_byte());
        buffer.extend_from_slice(&self.payload);

        let crc = crc16(&buffer);
        buffer.push((crc & 0xFF) as u8);
        buffer.push((crc >> 8) as u8);
        buffer
    }

    /// Parses exactly one complete frame.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidFrame` if the length does not match the size
    /// byte and `PhcError::CrcMismatch` if the checksum is wrong.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_OVERHEAD {
            return Err(PhcError::invalid_frame(format!(
                "frame too short: expected at least {} bytes, got {}",
                FRAME_OVERHEAD,
                data.len()
            )));
        }

        let size = (data[1] & SIZE_MASK) as usize;
        if data.len() != size + FRAME_OVERHEAD {
            return Err(PhcError::invalid_frame(format!(
                "length mismatch: size byte announces {} bytes, got {}",
                size + FRAME_OVERHEAD,
                data.len()
            )));
        }

        let body = &data[..2 + size];
        let received = u16::from_le_bytes([data[2 + size], data[3 + size]]);
        let expected = crc16(body);
        if expected != received {
            return Err(PhcError::crc_mismatch(expected, received));
        }

        Ok(Self {
            address: data[0],
            toggle: data[1] & TOGGLE_BIT != 0,
            payload: data[2..2 + size].to_vec(),
        })
    }
}

/// Reassembles frames from a fragmented byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Creates a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back from the previous call.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Discards any partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Appends `data` to the held-back bytes and returns every complete,
    /// valid frame found.
    ///
    /// A frame starts at a byte registered in `registry`. Bytes before it are
    /// dropped. Frames with a bad checksum or an unsupported size are dropped
    /// and scanning resumes right after their first byte. Identical frames
    /// are returned once per call.
    pub fn feed(&mut self, data: &[u8], registry: &ModuleRegistry) -> Vec<Frame> {
        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut keep_from = None;
        let mut pos = 0;

        while pos < buffer.len() {
            let Some(offset) = buffer[pos..].iter().position(|&b| registry.contains(b)) else {
                trace!("no module address in {}", format_frame(&buffer[pos..]));
                break;
            };
            if offset > 0 {
                trace!(
                    "skipping bytes of unknown modules: {}",
                    format_frame(&buffer[pos..pos + offset])
                );
            }

            let start = pos + offset;
            let remaining = buffer.len() - start;
            if remaining < 2 {
                keep_from = Some(start);
                break;
            }

            let size = (buffer[start + 1] & SIZE_MASK) as usize;
            if size > MAX_DECODED_PAYLOAD {
                debug!(
                    "unsupported payload size {} from 0x{:02X}",
                    size, buffer[start]
                );
                pos = start + 1;
                continue;
            }

            let total = size + FRAME_OVERHEAD;
            if remaining < total {
                // a false start must not hold back a complete frame behind it
                if let Some(next) = next_valid_start(&buffer, start, registry) {
                    trace!(
                        "dropping incomplete start at 0x{:02X}, frame follows",
                        buffer[start]
                    );
                    pos = next;
                    continue;
                }
                keep_from = Some(start);
                break;
            }

            let raw = &buffer[start..start + total];
            match Frame::from_bytes(raw) {
                Ok(frame) => {
                    if seen.insert(raw) {
                        frames.push(frame);
                    } else {
                        trace!("repeated frame {}", format_frame(raw));
                    }
                    pos = start + total;
                }
                Err(e) => {
                    debug!("dropping {}: {}", format_frame(raw), e);
                    pos = start + 1;
                }
            }
        }

        self.pending = keep_from
            .map(|start| buffer[start..].to_vec())
            .unwrap_or_default();
        frames
    }
}

/// Length of the complete, valid frame starting at `start`, if any.
fn valid_frame_len(buffer: &[u8], start: usize) -> Option<usize> {
    let size = (*buffer.get(start + 1)? & SIZE_MASK) as usize;
    if size > MAX_DECODED_PAYLOAD {
        return None;
    }
    let raw = buffer.get(start..start + size + FRAME_OVERHEAD)?;
    Frame::from_bytes(raw).ok().map(|_| raw.len())
}

/// First position after `start` holding a complete frame from a registered module.
fn next_valid_start(buffer: &[u8], start: usize, registry: &ModuleRegistry) -> Option<usize> {
    (start + 1..buffer.len())
        .find(|&p| registry.contains(buffer[p]) && valid_frame_len(buffer, p).is_some())
}
