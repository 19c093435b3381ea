//! PHC module types and bus addressing.
//!
//! A module's bus address combines a family prefix in the upper three bits
//! with the five-bit DIP-switch address set on the module:
//!
//! | Family | Prefix | Modules |
//! |--------|--------|---------|
//! | EM | `0x00` | input modules, with LED outputs |
//! | AM | `0x40` | relay output modules |
//! | JRM | `0x40` | shutter modules (share the AM prefix) |
//! | DIM | `0xA0` | dimmer modules |
//! | system | `0xE0` | control unit traffic |
//!
//! # Example
//!
//! ```
//! use phc_serial::ModuleType;
//!
//! assert_eq!(ModuleType::Am.bus_address(3).unwrap(), 0x43);
//! assert_eq!(ModuleType::Em.bus_address(3).unwrap(), 0x03);
//! assert_eq!(ModuleType::Dim.bus_address(1).unwrap(), 0xA1);
//! ```

use std::collections::BTreeSet;

use crate::error::{PhcError, Result};

/// Mask selecting the family prefix of a bus address.
pub const FAMILY_MASK: u8 = 0xE0;

/// Mask selecting the DIP-switch part of a bus address.
pub const DIP_MASK: u8 = 0x1F;

/// Highest DIP-switch address.
pub const MAX_DIP_ADDRESS: u8 = 0x1F;

/// Bus address used for broadcasts.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Family prefix of EM modules.
pub const FAMILY_EM: u8 = 0x00;

/// Family prefix of AM and JRM modules.
pub const FAMILY_AM: u8 = 0x40;

/// Family prefix of DIM modules.
pub const FAMILY_DIM: u8 = 0xA0;

/// Family prefix of control unit traffic.
pub const FAMILY_SYSTEM: u8 = 0xE0;

/// Module types attached to a PHC bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ModuleType {
    /// Input module; its LED outputs can be switched.
    Em,
    /// Relay output module.
    Am,
    /// Shutter module.
    Jrm,
    /// Dimmer module.
    Dim,
}

impl ModuleType {
    /// Returns the family prefix of this module type.
    pub fn family(self) -> u8 {
        match self {
            ModuleType::Em => FAMILY_EM,
            ModuleType::Am | ModuleType::Jrm => FAMILY_AM,
            ModuleType::Dim => FAMILY_DIM,
        }
    }

    /// Combines the family prefix with a DIP-switch address.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if `dip` exceeds 31.
    pub fn bus_address(self, dip: u8) -> Result<u8> {
        if dip > MAX_DIP_ADDRESS {
            return Err(PhcError::invalid_parameter(
                "address",
                format!("must be 0-{}", MAX_DIP_ADDRESS),
            ));
        }
        Ok(self.family() | dip)
    }

    /// Number of addressable output channels, or `None` if the bridge
    /// cannot send commands to this module type.
    pub fn channel_count(self) -> Option<u8> {
        match self {
            ModuleType::Em | ModuleType::Am => Some(8),
            ModuleType::Jrm => Some(4),
            ModuleType::Dim => None,
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleType::Em => write!(f, "EM"),
            ModuleType::Am => write!(f, "AM"),
            ModuleType::Jrm => write!(f, "JRM"),
            ModuleType::Dim => write!(f, "DIM"),
        }
    }
}

/// Returns the family prefix of a raw bus address.
#[inline]
pub fn family_of(address: u8) -> u8 {
    address & FAMILY_MASK
}

/// Returns the DIP-switch part of a raw bus address.
#[inline]
pub fn dip_of(address: u8) -> u8 {
    address & DIP_MASK
}

/// Set of bus addresses the decoder accepts as frame starts.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    addresses: BTreeSet<u8>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module and returns its bus address.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::{ModuleRegistry, ModuleType};
    ///
    /// let mut registry = ModuleRegistry::new();
    /// let address = registry.register(ModuleType::Am, 3).unwrap();
    /// assert!(registry.contains(address));
    /// ```
    pub fn register(&mut self, module_type: ModuleType, dip: u8) -> Result<u8> {
        let address = module_type.bus_address(dip)?;
        self.addresses.insert(address);
        Ok(address)
    }

    /// Registers a raw bus address.
    pub fn insert(&mut self, address: u8) {
        self.addresses.insert(address);
    }

    /// Returns whether `address` starts a frame.
    #[inline]
    pub fn contains(&self, address: u8) -> bool {
        self.addresses.contains(&address)
    }

    /// Number of registered addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns whether no module is registered.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Iterates over the registered addresses in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.addresses.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_address() {
        assert_eq!(ModuleType::Em.bus_address(0).unwrap(), 0x00);
        assert_eq!(ModuleType::Em.bus_address(31).unwrap(), 0x1F);
        assert_eq!(ModuleType::Am.bus_address(5).unwrap(), 0x45);
        assert_eq!(ModuleType::Jrm.bus_address(5).unwrap(), 0x45);
        assert_eq!(ModuleType::Dim.bus_address(2).unwrap(), 0xA2);
    }

    #[test]
    fn test_registry_insert_raw_address() {
        let mut registry = ModuleRegistry::new();
        registry.insert(0xE3);
        registry.insert(0xE3);
        assert!(registry.contains(0xE3));
        assert_eq!(family_of(0xE3), FAMILY_SYSTEM);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bus_address_out_of_range() {
        assert!(ModuleType::Am.bus_address(32).is_err());
    }

    #[test]
    fn test_family_and_dip() {
        assert_eq!(family_of(0x45), FAMILY_AM);
        assert_eq!(dip_of(0x45), 5);
        assert_eq!(family_of(0xE3), FAMILY_SYSTEM);
        assert_eq!(family_of(0x07), FAMILY_EM);
    }

    #[test]
    fn test_channel_count() {
        assert_eq!(ModuleType::Am.channel_count(), Some(8));
        assert_eq!(ModuleType::Em.channel_count(), Some(8));
        assert_eq!(ModuleType::Jrm.channel_count(), Some(4));
        assert_eq!(ModuleType::Dim.channel_count(), None);
    }

    #[test]
    fn test_registry() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.is_empty());

        registry.register(ModuleType::Em, 1).unwrap();
        registry.register(ModuleType::Am, 1).unwrap();
        registry.register(ModuleType::Jrm, 1).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(0x01));
        assert!(registry.contains(0x41));
        assert!(!registry.contains(0x02));
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![0x01, 0x41]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ModuleType::Em.to_string(), "EM");
        assert_eq!(ModuleType::Jrm.to_string(), "JRM");
    }
}
