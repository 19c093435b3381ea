//! # PHC Serial Protocol Library
//!
//! A Rust library for driving PEHA PHC modules over the RS-485 module bus,
//! replacing the PHC control unit.
//!
//! The library covers the wire protocol and the bus engine around it:
//! frame codec with the PHC CRC-16, output command encoding, the toggle
//! acknowledge used by the modules, a retry queue that re-sends a command
//! until the module reports the requested state, and EM input handling.
//!
//! ## Features
//!
//! - **Frame codec** with stream reassembly across serial reads
//! - **Typed commands** for AM relays, EM LEDs and JRM shutters
//! - **Retry queue** that stops as soon as the module confirms the state
//! - **Input events** for EM push buttons, acknowledged on the bus
//! - **No panics** in library code, all errors returned as `Result<T, PhcError>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use phc_serial::{Bridge, BridgeConfig, ModuleConfig, ModuleType, PhcCommand};
//!
//! fn main() -> phc_serial::Result<()> {
//!     let config = BridgeConfig::new("/dev/ttyUSB0")
//!         .with_module(ModuleConfig::new(ModuleType::Em, 0))
//!         .with_module(ModuleConfig::new(ModuleType::Am, 3))
//!         .with_module(ModuleConfig::new(ModuleType::Jrm, 1).with_shutter_time(0, 300));
//!
//!     // Opens the port, resets and polls the bus, starts the worker threads
//!     let (bridge, events) = Bridge::open(config)?;
//!
//!     // Relay 2 of AM module 3
//!     bridge.send(ModuleType::Am, 3, 2, PhcCommand::On)?;
//!
//!     // Shutter 0 of JRM module 1, runs for 30 s
//!     bridge.send(ModuleType::Jrm, 1, 0, PhcCommand::Down)?;
//!
//!     for event in events.iter() {
//!         println!("EM {} input {}: {}", event.module, event.channel, event.state);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Addressing
//!
//! Modules are addressed by the value of their five DIP switches (0-31).
//! The bus address adds the family bits:
//!
//! | Module | Family | Channels | Commands |
//! |--------|:------:|:--------:|----------|
//! | [`ModuleType::Em`] | `0x00` | 16 inputs, 8 LEDs | `ON`, `OFF` (LEDs) |
//! | [`ModuleType::Am`] | `0x40` | 8 relays | `ON`, `OFF` |
//! | [`ModuleType::Jrm`] | `0x40` | 4 shutters | `UP`, `DOWN`, `STOP` |
//! | [`ModuleType::Dim`] | `0xA0` | - | none |
//!
//! ## Frames
//!
//! ```
//! use phc_serial::{Frame, FrameDecoder, ModuleRegistry, ModuleType};
//!
//! let frame = Frame::new(0x43, vec![0x42], false)?;
//! assert_eq!(frame.to_bytes(), vec![0x43, 0x01, 0x42, 0x10, 0x57]);
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(ModuleType::Am, 3)?;
//!
//! let mut decoder = FrameDecoder::new();
//! let bytes = frame.to_bytes();
//! assert!(decoder.feed(&bytes[..2], &registry).is_empty());
//! assert_eq!(decoder.feed(&bytes[2..], &registry), vec![frame]);
//! # Ok::<(), phc_serial::PhcError>(())
//! ```
//!
//! ## Utility Functions
//!
//! ```
//! use phc_serial::utils::{format_binary, format_frame, parse_dip_address};
//!
//! assert_eq!(parse_dip_address("11000").unwrap(), 3);
//! assert_eq!(format_binary(0x43), "01000011");
//! assert_eq!(format_frame(&[0x43, 0x01, 0x42]), "43 01 42");
//! ```
//!
//! ## Error Handling
//!
//! ```no_run
//! use phc_serial::{Bridge, BridgeConfig, PhcError};
//!
//! match Bridge::open(BridgeConfig::new("/dev/ttyUSB0")) {
//!     Ok((bridge, _events)) => println!("{:?}", bridge.status()),
//!     Err(PhcError::PortNotFound { port, available }) => {
//!         println!("{} not found, available: {}", port, available.join(", "));
//!     }
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```
//!
//! ## Logging
//!
//! The library logs through the [`log`](https://docs.rs/log) facade. Frames
//! sent and received are logged at `debug` level in binary notation, unknown
//! bytes and reassembly at `trace`.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod bridge;
mod command;
mod config;
pub mod crc;
mod error;
mod frame;
mod module;
mod queue;
mod state;
mod transport;
pub mod utils;

// Public re-exports
pub use bridge::{Bridge, BridgeStatus, InputEvent, OfflineReason};
pub use command::{
    am_config, em_acknowledge, em_config, encode_command, module_poll, por_broadcast, validate,
    PhcCommand, CONFIG_REQUEST, DEFAULT_SHUTTER_TIME, EM_INPUT_COUNT, POLL, STATUS_REPORT,
};
pub use config::{
    BridgeConfig, ModuleConfig, DEFAULT_ACK_REPEATS, DEFAULT_BAUD_RATE, DEFAULT_IDLE_WAIT,
    DEFAULT_POR_REPEATS, DEFAULT_READ_TIMEOUT, SEND_RETRY_COUNT, SEND_RETRY_TIME,
};
pub use error::{PhcError, Result};
pub use frame::{
    Frame, FrameDecoder, FRAME_OVERHEAD, MAX_DECODED_PAYLOAD, MAX_PAYLOAD_SIZE, SIZE_MASK,
    TOGGLE_BIT,
};
pub use module::{
    dip_of, family_of, ModuleRegistry, ModuleType, BROADCAST_ADDRESS, DIP_MASK, FAMILY_AM,
    FAMILY_DIM, FAMILY_EM, FAMILY_MASK, FAMILY_SYSTEM, MAX_DIP_ADDRESS,
};
pub use queue::{PendingCommand, RetryQueue};
pub use state::{InputStates, OutputStateCache, ToggleMap, MODULES_PER_FAMILY};
pub use transport::{
    available_ports, FrameWriter, SerialReader, SerialTransport, SerialWriter,
};
