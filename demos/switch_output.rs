//! Example: Switching outputs
//!
//! Run with: cargo run --example switch_output -- /dev/ttyUSB0
//!
//! This example demonstrates:
//! - Switching AM relays and waiting for the module to confirm
//! - Driving a JRM shutter with a per-channel run time
//! - Handling a missing serial port

use phc_serial::utils::format_binary;
use phc_serial::{Bridge, BridgeConfig, ModuleConfig, ModuleType, PhcCommand, PhcError};
use std::thread;
use std::time::Duration;

fn main() -> phc_serial::Result<()> {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    // =========================================================================
    // Open the bus
    // =========================================================================

    let config = BridgeConfig::new(port)
        .with_module(ModuleConfig::new(ModuleType::Am, 3))
        .with_module(ModuleConfig::new(ModuleType::Jrm, 1).with_shutter_time(0, 150));

    let (bridge, _events) = match Bridge::open(config) {
        Ok(opened) => opened,
        Err(PhcError::PortNotFound { port, available }) => {
            eprintln!("Serial port {} not found", port);
            eprintln!("Available ports: {}", available.join(", "));
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // =========================================================================
    // Relays
    // =========================================================================

    println!("=== AM module 3 ===\n");

    for channel in 0..8 {
        bridge.send(ModuleType::Am, 3, channel, PhcCommand::On)?;
    }
    thread::sleep(Duration::from_millis(500));
    println!("Outputs: {}", format_binary(bridge.output_state(ModuleType::Am, 3)));

    for channel in 0..8 {
        bridge.send(ModuleType::Am, 3, channel, PhcCommand::Off)?;
    }
    thread::sleep(Duration::from_millis(500));
    println!("Outputs: {}", format_binary(bridge.output_state(ModuleType::Am, 3)));

    // =========================================================================
    // Shutter
    // =========================================================================

    println!("\n=== JRM module 1 ===\n");

    bridge.send(ModuleType::Jrm, 1, 0, PhcCommand::Down)?;
    println!("Shutter 0 down for 15 s");
    thread::sleep(Duration::from_secs(5));

    bridge.send(ModuleType::Jrm, 1, 0, PhcCommand::Stop)?;
    println!("Shutter 0 stopped");

    // Let the retry loop drain before dropping the bridge
    while bridge.pending_commands() > 0 {
        thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
