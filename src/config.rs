//! Bridge configuration.
//!
//! ```
//! use phc_serial::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::new("/dev/ttyUSB0")
//!     .with_retry_count(10)
//!     .with_retry_interval(Duration::from_millis(100));
//!
//! assert_eq!(config.baud_rate, 19200);
//! assert_eq!(config.retry_count, 10);
//! ```

use std::time::Duration;

use crate::command::DEFAULT_SHUTTER_TIME;
use crate::error::Result;
use crate::module::ModuleType;
use crate::utils::parse_dip_address;

/// Serial line speed of the PHC bus.
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Maximum number of writes of one command.
pub const SEND_RETRY_COUNT: u32 = 15;

/// Time to wait for the output state report before writing again.
pub const SEND_RETRY_TIME: Duration = Duration::from_millis(80);

/// Number of power-on reset broadcasts at startup.
pub const DEFAULT_POR_REPEATS: u32 = 20;

/// Number of times each EM acknowledge is written.
pub const DEFAULT_ACK_REPEATS: u32 = 2;

/// Read timeout of the serial port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Longest sleep of the retry worker when nothing is queued.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(500);

/// A module attached to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleConfig {
    /// Module type.
    pub module_type: ModuleType,
    /// DIP-switch address (0-31).
    pub address: u8,
    /// Shutter run time per channel in tenths of a second (JRM only).
    #[cfg_attr(feature = "serde", serde(default))]
    pub shutter_times: Vec<u16>,
}

impl ModuleConfig {
    /// Creates a module entry for DIP address `address`.
    pub fn new(module_type: ModuleType, address: u8) -> Self {
        Self {
            module_type,
            address,
            shutter_times: Vec::new(),
        }
    }

    /// Creates a module entry from its DIP-switch setting, e.g. `"10100"`.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if the switch string is malformed.
    pub fn from_dip_switches(module_type: ModuleType, switches: &str) -> Result<Self> {
        Ok(Self::new(module_type, parse_dip_address(switches)?))
    }

    /// Sets the shutter run time of `channel` in tenths of a second.
    pub fn with_shutter_time(mut self, channel: u8, tenths: u16) -> Self {
        let index = channel as usize;
        if self.shutter_times.len() <= index {
            self.shutter_times.resize(index + 1, DEFAULT_SHUTTER_TIME);
        }
        self.shutter_times[index] = tenths;
        self
    }
}

/// Configuration of one bridge (one serial port).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BridgeConfig {
    /// Serial port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Read timeout of the serial port.
    pub read_timeout: Duration,
    /// Maximum number of writes of one command.
    pub retry_count: u32,
    /// Delay between two writes of the same command.
    pub retry_interval: Duration,
    /// Number of power-on reset broadcasts at startup.
    pub por_repeats: u32,
    /// Number of times each EM acknowledge is written.
    pub ack_repeats: u32,
    /// Longest sleep of the retry worker when nothing is queued.
    pub idle_wait: Duration,
    /// Modules registered at startup.
    pub modules: Vec<ModuleConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry_count: SEND_RETRY_COUNT,
            retry_interval: SEND_RETRY_TIME,
            por_repeats: DEFAULT_POR_REPEATS,
            ack_repeats: DEFAULT_ACK_REPEATS,
            idle_wait: DEFAULT_IDLE_WAIT,
            modules: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration for `port` with the bus defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Sets a custom line speed (default is 19200).
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Sets the serial read timeout (default is 50 ms).
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the maximum number of writes per command (default is 15).
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Sets the delay between writes of the same command (default is 80 ms).
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the number of power-on reset broadcasts (default is 20).
    pub fn with_por_repeats(mut self, repeats: u32) -> Self {
        self.por_repeats = repeats;
        self
    }

    /// Sets how often each EM acknowledge is written (default is 2).
    pub fn with_ack_repeats(mut self, repeats: u32) -> Self {
        self.ack_repeats = repeats;
        self
    }

    /// Sets the longest idle sleep of the retry worker (default is 500 ms).
    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    /// Adds a module registered at startup.
    pub fn with_module(mut self, module: ModuleConfig) -> Self {
        self.modules.push(module);
        self
    }
}
