//! CRC-16 checksum used on the PHC module bus.
//!
//! Every frame ends with a 16-bit checksum over the address byte, the
//! size/toggle byte and the payload, transmitted low byte first. The modules
//! validate it bit for bit, so the update step below must not change.
//!
//! The algorithm folds one byte at a time: the byte is XOR-ed with the low
//! half of the running CRC, mixed with its own upper nibble and recombined
//! with the high half. Starting at `0xFFFF` and inverting the result yields
//! the same values as CRC-16/IBM-SDLC (X.25).
//!
//! # Example
//!
//! ```
//! use phc_serial::crc::crc16;
//!
//! assert_eq!(crc16(b"123456789"), 0x906E);
//! ```

/// Initial CRC register value.
pub const CRC_INIT: u16 = 0xFFFF;

/// Value XOR-ed into the register after the last byte.
pub const CRC_XOR_OUT: u16 = 0xFFFF;

/// Folds one byte into the running CRC.
#[inline]
pub fn crc16_update(crc: u16, data: u8) -> u16 {
    let mut data = data ^ (crc & 0xFF) as u8;
    data ^= data << 4;
    let data16 = u16::from(data);

    ((data16 << 8) | (crc >> 8)) ^ u16::from(data >> 4) ^ (data16 << 3)
}

/// Computes the finished checksum of `bytes`.
///
/// # Example
///
/// ```
/// use phc_serial::crc::crc16;
///
/// // AM module 3, channel 2 ON
/// assert_eq!(crc16(&[0x43, 0x01, 0x42]), 0x5710);
/// ```
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(CRC_INIT, |crc, &b| crc16_update(crc, b)) ^ CRC_XOR_OUT
}
