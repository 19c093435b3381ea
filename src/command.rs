//! Command encoding for PHC modules.
//!
//! This module builds the frames the bridge sends on the bus. Output
//! commands go through [`encode_command`]. The bus management frames
//! (power-on reset, poll, configuration, acknowledge) have their own builders.
//!
//! # Command Bytes
//!
//! | Module | Byte 0 | Further bytes |
//! |--------|--------|---------------|
//! | AM | `channel << 5 \| 2 (on) / 3 (off)` | - |
//! | EM LED | `channel << 4 \| 2 (on) / 3 (off)` | - |
//! | JRM | `channel << 5 \| 5 (up) / 6 (down) / 2 (stop)` | `0x3F`, run time LSB, MSB (up/down only) |
//!
//! # Example
//!
//! ```
//! use phc_serial::{encode_command, ModuleType, PhcCommand, DEFAULT_SHUTTER_TIME};
//!
//! let frame = encode_command(ModuleType::Am, 3, 2, PhcCommand::On, DEFAULT_SHUTTER_TIME, false).unwrap();
//! assert_eq!(frame.address, 0x43);
//! assert_eq!(frame.payload, vec![0x42]);
//! ```

use crate::error::{PhcError, Result};
use crate::frame::Frame;
use crate::module::{ModuleType, BROADCAST_ADDRESS, MAX_DIP_ADDRESS};

/// Switch output on.
pub(crate) const FN_ON: u8 = 0x02;
/// Switch output off.
pub(crate) const FN_OFF: u8 = 0x03;
/// Drive shutter up.
pub(crate) const FN_UP: u8 = 0x05;
/// Drive shutter down.
pub(crate) const FN_DOWN: u8 = 0x06;
/// Stop shutter.
pub(crate) const FN_STOP: u8 = 0x02;
/// Second byte of every JRM command.
pub(crate) const JRM_OPTIONS: u8 = 0x3F;
/// First byte of a configuration frame.
pub(crate) const CONFIG_MARKER: u8 = 0xFE;

/// First payload byte of an output state report.
pub const STATUS_REPORT: u8 = 0x00;
/// First payload byte of a configuration request from a module.
pub const CONFIG_REQUEST: u8 = 0xFF;
/// First payload byte of a poll frame.
pub const POLL: u8 = 0x01;

/// Default shutter run time in tenths of a second (600 s).
pub const DEFAULT_SHUTTER_TIME: u16 = 0x1770;

/// Number of EM inputs announced in the configuration frame.
pub const EM_INPUT_COUNT: u8 = 16;

/// Commands accepted by PHC output modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum PhcCommand {
    /// Switch on.
    On,
    /// Switch off.
    Off,
    /// Drive up.
    Up,
    /// Drive down.
    Down,
    /// Stop moving.
    Stop,
}

impl PhcCommand {
    /// Output bit a module reports once the command took effect, if the
    /// command maps to one.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::PhcCommand;
    ///
    /// assert_eq!(PhcCommand::On.expected_output(), Some(true));
    /// assert_eq!(PhcCommand::Up.expected_output(), None);
    /// ```
    pub fn expected_output(self) -> Option<bool> {
        match self {
            PhcCommand::On => Some(true),
            PhcCommand::Off => Some(false),
            PhcCommand::Up | PhcCommand::Down | PhcCommand::Stop => None,
        }
    }

    /// Returns whether this is an on/off command.
    pub fn is_switch(self) -> bool {
        matches!(self, PhcCommand::On | PhcCommand::Off)
    }

    /// Returns whether this is a shutter command.
    pub fn is_shutter(self) -> bool {
        matches!(self, PhcCommand::Up | PhcCommand::Down | PhcCommand::Stop)
    }

    fn switch_code(self) -> u8 {
        if self == PhcCommand::On {
            FN_ON
        } else {
            FN_OFF
        }
    }
}

impl std::fmt::Display for PhcCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhcCommand::On => write!(f, "ON"),
            PhcCommand::Off => write!(f, "OFF"),
            PhcCommand::Up => write!(f, "UP"),
            PhcCommand::Down => write!(f, "DOWN"),
            PhcCommand::Stop => write!(f, "STOP"),
        }
    }
}

/// Checks that `command` can be sent to `channel` of a `module_type` module
/// at DIP address `dip`.
///
/// # Errors
///
/// Returns `PhcError::UnsupportedModule` for module types without outputs
/// and `PhcError::InvalidParameter` for out-of-range addresses, channels or
/// commands the module does not understand.
pub fn validate(module_type: ModuleType, dip: u8, channel: u8, command: PhcCommand) -> Result<()> {
    let Some(channels) = module_type.channel_count() else {
        return Err(PhcError::unsupported_module(module_type.to_string()));
    };

    if dip > MAX_DIP_ADDRESS {
        return Err(PhcError::invalid_parameter(
            "address",
            format!("must be 0-{}", MAX_DIP_ADDRESS),
        ));
    }
    if channel >= channels {
        return Err(PhcError::invalid_parameter(
            "channel",
            format!("must be 0-{} for {} modules", channels - 1, module_type),
        ));
    }

    let accepted = match module_type {
        ModuleType::Jrm => command.is_shutter(),
        _ => command.is_switch(),
    };
    if !accepted {
        return Err(PhcError::invalid_parameter(
            "command",
            format!("{} is not accepted by {} modules", command, module_type),
        ));
    }
    Ok(())
}

/// Encodes an output command.
///
/// `shutter_time` is only used for JRM up/down commands, in tenths of a second.
///
/// # Errors
///
/// See [`validate`].
pub fn encode_command(
    module_type: ModuleType,
    dip: u8,
    channel: u8,
    command: PhcCommand,
    shutter_time: u16,
    toggle: bool,
) -> Result<Frame> {
    validate(module_type, dip, channel, command)?;
    let address = module_type.bus_address(dip)?;

    let payload = match module_type {
        ModuleType::Am => vec![(channel << 5) | command.switch_code()],
        ModuleType::Em => vec![(channel << 4) | command.switch_code()],
        ModuleType::Jrm => {
            let [lsb, msb] = shutter_time.to_le_bytes();
            match command {
                PhcCommand::Up => vec![(channel << 5) | FN_UP, JRM_OPTIONS, lsb, msb],
                PhcCommand::Down => vec![(channel << 5) | FN_DOWN, JRM_OPTIONS, lsb, msb],
                _ => vec![(channel << 5) | FN_STOP, JRM_OPTIONS],
            }
        }
        ModuleType::Dim => return Err(PhcError::unsupported_module(module_type.to_string())),
    };

    Frame::new(address, payload, toggle)
}

/// Power-on reset broadcast sent when the bridge starts.
pub fn por_broadcast() -> Frame {
    Frame {
        address: BROADCAST_ADDRESS,
        toggle: false,
        payload: vec![0x00],
    }
}

/// Poll frame asking the module at `address` to announce itself.
pub fn module_poll(address: u8) -> Frame {
    Frame {
        address,
        toggle: false,
        payload: vec![POLL],
    }
}

/// Configuration answer for an AM or JRM module.
pub fn am_config(address: u8) -> Frame {
    Frame {
        address,
        toggle: false,
        payload: vec![CONFIG_MARKER, 0x00, 0xFF],
    }
}

/// Configuration answer for an EM module, enabling the on, off and long
/// press events of all inputs.
pub fn em_config(address: u8) -> Frame {
    let mut payload = Vec::with_capacity(4 + 3 * EM_INPUT_COUNT as usize);
    payload.extend_from_slice(&[CONFIG_MARKER, 0x00, 0x00, 0x00]);
    for input in 0..EM_INPUT_COUNT {
        payload.push((input << 4) | FN_ON);
        payload.push((input << 4) | FN_OFF);
        payload.push((input << 4) | 0x05);
    }
    Frame {
        address,
        toggle: false,
        payload,
    }
}

/// Acknowledge of an EM input frame, echoing its toggle flag.
pub fn em_acknowledge(address: u8, toggle: bool) -> Frame {
    Frame {
        address,
        toggle,
        payload: vec![0x00],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_am_on_off() {
        let on = encode_command(ModuleType::Am, 3, 2, PhcCommand::On, 0, false).unwrap();
        assert_eq!(on.address, 0x43);
        assert_eq!(on.payload, vec![0x42]);

        let off = encode_command(ModuleType::Am, 3, 7, PhcCommand::Off, 0, true).unwrap();
        assert_eq!(off.payload, vec![0xE3]);
        assert!(off.toggle);
    }

    #[test]
    fn test_em_led() {
        let frame = encode_command(ModuleType::Em, 5, 4, PhcCommand::On, 0, false).unwrap();
        assert_eq!(frame.address, 0x05);
        assert_eq!(frame.payload, vec![0x42]);
    }

    #[test]
    fn test_jrm_up_down_stop() {
        let up = encode_command(ModuleType::Jrm, 1, 1, PhcCommand::Up, DEFAULT_SHUTTER_TIME, false)
            .unwrap();
        assert_eq!(up.address, 0x41);
        assert_eq!(up.payload, vec![0x25, 0x3F, 0x70, 0x17]);

        let down = encode_command(ModuleType::Jrm, 1, 0, PhcCommand::Down, 300, false).unwrap();
        assert_eq!(down.payload, vec![0x06, 0x3F, 0x2C, 0x01]);

        let stop = encode_command(ModuleType::Jrm, 1, 3, PhcCommand::Stop, 300, false).unwrap();
        assert_eq!(stop.payload, vec![0x62, 0x3F]);
    }

    #[test]
    fn test_validate_rejects_mismatches() {
        assert!(matches!(
            validate(ModuleType::Am, 0, 0, PhcCommand::Up),
            Err(PhcError::InvalidParameter { .. })
        ));
        assert!(matches!(
            validate(ModuleType::Jrm, 0, 0, PhcCommand::On),
            Err(PhcError::InvalidParameter { .. })
        ));
        assert!(validate(ModuleType::Am, 0, 8, PhcCommand::On).is_err());
        assert!(validate(ModuleType::Jrm, 0, 4, PhcCommand::Stop).is_err());
        assert!(validate(ModuleType::Em, 32, 0, PhcCommand::On).is_err());
        assert!(matches!(
            validate(ModuleType::Dim, 0, 0, PhcCommand::On),
            Err(PhcError::UnsupportedModule { .. })
        ));
    }

    #[test]
    fn test_por_broadcast() {
        assert_eq!(por_broadcast().to_bytes(), hex::decode("ff0100e719").unwrap());
    }

    #[test]
    fn test_module_poll() {
        assert_eq!(module_poll(0x00).to_bytes(), hex::decode("0001019dce").unwrap());
    }

    #[test]
    fn test_am_config() {
        assert_eq!(am_config(0x43).payload, vec![0xFE, 0x00, 0xFF]);
    }

    #[test]
    fn test_em_config() {
        let frame = em_config(0x05);
        assert_eq!(frame.payload.len(), 52);
        assert_eq!(&frame.payload[..4], &[0xFE, 0x00, 0x00, 0x00]);
        assert_eq!(&frame.payload[4..7], &[0x02, 0x03, 0x05]);
        assert_eq!(&frame.payload[49..], &[0xF2, 0xF3, 0xF5]);
        assert_eq!(frame.size_byte(), 52);
    }

    #[test]
    fn test_em_acknowledge() {
        assert_eq!(
            em_acknowledge(0x05, true).to_bytes(),
            hex::decode("058100656a").unwrap()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(PhcCommand::Stop.to_string(), "STOP");
    }
}
