//! Byte formatting and bit helpers.
//!
//! Output state bytes pack one bit per module channel, channel 0 in the least
//! significant bit. The formatting helpers render frames for log output.
//!
//! # Example
//!
//! ```
//! use phc_serial::utils::{format_binary, format_frame, get_bit, set_bit};
//!
//! let state: u8 = 0b0000_0100;
//! assert!(get_bit(state, 2));
//! assert_eq!(set_bit(state, 0, true), 0b0000_0101);
//!
//! assert_eq!(format_binary(0x43), "01000011");
//! assert_eq!(format_frame(&[0x43, 0x01, 0x42]), "43 01 42");
//! ```

use std::fmt::Write;

use crate::error::{PhcError, Result};
use crate::module::MAX_DIP_ADDRESS;

/// Number of DIP switches selecting a module address.
pub const DIP_SWITCH_COUNT: usize = 5;

/// Gets a single bit from a state byte.
///
/// # Example
///
/// ```
/// use phc_serial::utils::get_bit;
///
/// assert!(get_bit(0b0000_0101, 0));
/// assert!(!get_bit(0b0000_0101, 1));
/// ```
#[inline]
pub fn get_bit(value: u8, bit: u8) -> bool {
    bit < 8 && (value >> bit) & 0x01 == 1
}

/// Sets or clears a single bit of a state byte.
#[inline]
pub fn set_bit(value: u8, bit: u8, state: bool) -> u8 {
    if bit >= 8 {
        return value;
    }
    if state {
        value | (1 << bit)
    } else {
        value & !(1 << bit)
    }
}

/// Formats a byte as eight binary digits.
pub fn format_binary(value: u8) -> String {
    format!("{:08b}", value)
}

/// Formats a byte as `0x..`.
pub fn format_hex(value: u8) -> String {
    format!("0x{:02X}", value)
}

/// Formats a frame as space separated hex bytes.
pub fn format_frame(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Formats a frame as space separated binary bytes.
pub fn format_frame_binary(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| format_binary(b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a DIP-switch setting into a module address.
///
/// The string lists switches 1 to 5 from left to right, `1` meaning ON.
/// Switch 1 is the least significant bit.
///
/// # Errors
///
/// Returns `PhcError::InvalidParameter` unless the input is exactly five
/// `0`/`1` characters.
///
/// # Example
///
/// ```
/// use phc_serial::utils::parse_dip_address;
///
/// assert_eq!(parse_dip_address("10000").unwrap(), 1);
/// assert_eq!(parse_dip_address("10100").unwrap(), 5);
/// assert_eq!(parse_dip_address("11111").unwrap(), 31);
/// ```
pub fn parse_dip_address(switches: &str) -> Result<u8> {
    let switches = switches.trim();
    if switches.len() != DIP_SWITCH_COUNT {
        return Err(PhcError::invalid_parameter(
            "address",
            format!("expected {} DIP switches, got '{}'", DIP_SWITCH_COUNT, switches),
        ));
    }

    let mut address = 0u8;
    for (i, c) in switches.chars().enumerate() {
        match c {
            '1' => address |= 1 << i,
            '0' => {}
            other => {
                return Err(PhcError::invalid_parameter(
                    "address",
                    format!("invalid DIP switch value '{}'", other),
                ))
            }
        }
    }
    debug_assert!(address <= MAX_DIP_ADDRESS);
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bit() {
        let value = 0b1000_0001;
        assert!(get_bit(value, 0));
        assert!(get_bit(value, 7));
        assert!(!get_bit(value, 3));
        assert!(!get_bit(value, 8));
    }

    #[test]
    fn test_set_bit() {
        assert_eq!(set_bit(0, 3, true), 0b0000_1000);
        assert_eq!(set_bit(0xFF, 3, false), 0b1111_0111);
        assert_eq!(set_bit(0x12, 9, true), 0x12);
    }

    #[test]
    fn test_format_binary() {
        assert_eq!(format_binary(0), "00000000");
        assert_eq!(format_binary(0x81), "10000001");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(0x0A), "0x0A");
    }

    #[test]
    fn test_format_frame() {
        assert_eq!(format_frame(&[]), "");
        assert_eq!(format_frame(&[0x05, 0x81, 0x00, 0x65, 0x6A]), "05 81 00 65 6A");
        assert_eq!(format_frame_binary(&[0x05, 0x81]), "00000101 10000001");
    }

    #[test]
    fn test_parse_dip_address() {
        assert_eq!(parse_dip_address("00000").unwrap(), 0);
        assert_eq!(parse_dip_address("01000").unwrap(), 2);
        assert_eq!(parse_dip_address(" 00001 ").unwrap(), 16);
    }

    #[test]
    fn test_parse_dip_address_invalid() {
        assert!(parse_dip_address("0000").is_err());
        assert!(parse_dip_address("000000").is_err());
        assert!(parse_dip_address("0012x").is_err());
    }
}
