//! Read the live power draw of one Circle.
//!
//! Demonstrates connecting to the Stick, switching a plug on, and taking
//! a calibrated power reading. The relay probe and calibration fetch
//! happen automatically on the first read.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p plugwise --example read_power -- /dev/ttyUSB0 000D6F0000B1B64B
//! ```

use plugwise::StickBuilder;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let mac = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: read_power <serial-port> <circle-mac>"))?
        .parse()?;

    println!("Connecting to Stick on {port}...");
    let stick = StickBuilder::new()
        .serial_port(&port)
        .command_timeout(Duration::from_secs(2))
        .build()
        .await?;

    let circle = stick.circle(&mac);

    let info = circle.info().await?;
    println!(
        "Circle {}: relay {}, clock {}, {} Hz mains",
        mac,
        if info.relay_on { "on" } else { "off" },
        info.clock,
        info.hertz
    );

    if !info.relay_on {
        println!("Relay is off; switching on...");
        circle.power_on().await?;
    }

    let reading = circle.power_info().await?;
    println!(
        "Power draw: {:.1} W ({:.5} kWh/h, {:.0} corrected pulses)",
        reading.watts, reading.kwh, reading.pulses
    );

    Ok(())
}
