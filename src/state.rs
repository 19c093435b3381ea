//! Per-module state kept by the bridge.
//!
//! - [`OutputStateCache`] holds the last output byte each module reported.
//! - [`ToggleMap`] holds the toggle flag of the next frame per module channel.
//! - [`InputStates`] holds the last input state forwarded per EM channel.

use std::collections::HashMap;

use crate::module::{dip_of, ModuleType};
use crate::utils::get_bit;

/// Number of DIP addresses per module family.
pub const MODULES_PER_FAMILY: usize = 32;

/// Last reported output bits of EM LED and AM modules.
#[derive(Debug, Clone)]
pub struct OutputStateCache {
    em_led: [u8; MODULES_PER_FAMILY],
    am: [u8; MODULES_PER_FAMILY],
}

impl Default for OutputStateCache {
    fn default() -> Self {
        Self {
            em_led: [0; MODULES_PER_FAMILY],
            am: [0; MODULES_PER_FAMILY],
        }
    }
}

impl OutputStateCache {
    /// Creates a cache with every output off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the output byte reported by a module.
    ///
    /// JRM and DIM reports are not decoded and leave the cache unchanged.
    pub fn set(&mut self, module_type: ModuleType, address: u8, state: u8) {
        let index = dip_of(address) as usize;
        match module_type {
            ModuleType::Em => self.em_led[index] = state,
            ModuleType::Am => self.am[index] = state,
            ModuleType::Jrm | ModuleType::Dim => {}
        }
    }

    /// Output byte of a module. JRM modules read the AM bank.
    pub fn get(&self, module_type: ModuleType, address: u8) -> u8 {
        let index = dip_of(address) as usize;
        match module_type {
            ModuleType::Em => self.em_led[index],
            ModuleType::Am | ModuleType::Jrm => self.am[index],
            ModuleType::Dim => 0,
        }
    }

    /// Returns whether the output bit of `channel` is on.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::{ModuleType, OutputStateCache};
    ///
    /// let mut cache = OutputStateCache::new();
    /// cache.set(ModuleType::Am, 0x43, 0b0000_0100);
    /// assert!(cache.is_set(ModuleType::Am, 3, 2));
    /// assert!(!cache.is_set(ModuleType::Am, 3, 1));
    /// ```
    pub fn is_set(&self, module_type: ModuleType, address: u8, channel: u8) -> bool {
        get_bit(self.get(module_type, address), channel)
    }
}

/// Toggle flag per bus address and channel.
#[derive(Debug, Clone, Default)]
pub struct ToggleMap {
    toggles: HashMap<(u8, u8), bool>,
}

impl ToggleMap {
    /// Creates a map with every flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the flag for the next frame and flips the stored value.
    ///
    /// # Example
    ///
    /// ```
    /// use phc_serial::ToggleMap;
    ///
    /// let mut toggles = ToggleMap::new();
    /// assert!(!toggles.next(0x43, 2));
    /// assert!(toggles.next(0x43, 2));
    /// assert!(!toggles.next(0x43, 2));
    /// assert!(!toggles.next(0x43, 3));
    /// ```
    pub fn next(&mut self, address: u8, channel: u8) -> bool {
        let toggle = self.toggles.entry((address, channel)).or_insert(false);
        let current = *toggle;
        *toggle = !current;
        current
    }

    /// Flag the next frame to this channel will carry.
    pub fn peek(&self, address: u8, channel: u8) -> bool {
        self.toggles
            .get(&(address, channel))
            .copied()
            .unwrap_or(false)
    }
}

/// Last input state forwarded per EM module and channel.
#[derive(Debug, Clone, Default)]
pub struct InputStates {
    states: HashMap<(u8, u8), bool>,
}

impl InputStates {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` and returns whether it differs from the last one.
    pub fn update(&mut self, address: u8, channel: u8, state: bool) -> bool {
        self.states.insert((address, channel), state) != Some(state)
    }

    /// Last recorded state.
    pub fn get(&self, address: u8, channel: u8) -> Option<bool> {
        self.states.get(&(address, channel)).copied()
    }
}
