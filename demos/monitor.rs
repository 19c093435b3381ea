//! Example: Watching EM push buttons
//!
//! Run with: cargo run --example monitor -- /dev/ttyUSB0
//!
//! This example demonstrates:
//! - Opening a bridge with a set of registered modules
//! - Receiving input events from EM modules
//! - Mirroring each input on the EM LED of the same channel
//!
//! Set `RUST_LOG=phc_serial=debug` to see every frame on the bus.

use phc_serial::utils::format_binary;
use phc_serial::{Bridge, BridgeConfig, ModuleConfig, ModuleType, PhcCommand};

fn main() -> phc_serial::Result<()> {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    // =========================================================================
    // Open the bus
    // =========================================================================

    let config = BridgeConfig::new(port)
        .with_module(ModuleConfig::new(ModuleType::Em, 0))
        .with_module(ModuleConfig::new(ModuleType::Em, 1))
        .with_module(ModuleConfig::from_dip_switches(ModuleType::Am, "11000")?);

    let (bridge, events) = Bridge::open(config)?;
    println!("Bridge status: {:?}", bridge.status());

    // =========================================================================
    // Forward inputs
    // =========================================================================

    println!("\n=== Waiting for input events (Ctrl+C to quit) ===\n");

    for event in events.iter() {
        println!(
            "EM {:2} input {:2} {:3} (event 0x{:02X})",
            event.module,
            event.channel,
            if event.state { "ON" } else { "OFF" },
            event.code
        );

        // EM modules have 8 LEDs for 16 inputs
        if event.channel < 8 {
            let command = if event.state {
                PhcCommand::On
            } else {
                PhcCommand::Off
            };
            bridge.send(ModuleType::Em, event.module, event.channel, command)?;
        }

        println!(
            "   LEDs: {}",
            format_binary(bridge.output_state(ModuleType::Em, event.module))
        );
    }

    Ok(())
}
