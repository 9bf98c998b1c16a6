//! Dump recent pages of a Circle's on-device power log.
//!
//! The Circle appends a timestamped sample to its circular log buffer
//! every hour; each page holds four samples. The current write position
//! comes from the info response.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p plugwise --example power_log -- /dev/ttyUSB0 000D6F0000B1B64B
//! ```

use plugwise::StickBuilder;
use std::time::Duration;

/// How many four-sample pages to read back from the write position.
const PAGES: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let mac = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: power_log <serial-port> <circle-mac>"))?
        .parse()?;

    let stick = StickBuilder::new()
        .serial_port(&port)
        .command_timeout(Duration::from_secs(2))
        .build()
        .await?;

    let circle = stick.circle(&mac);

    let info = circle.info().await?;
    println!("Circle {mac}: log write position at slot {}", info.log_address);

    let first = info.log_address.saturating_sub(PAGES - 1);
    for address in first..=info.log_address {
        let samples = circle.power_buffer_info(address).await?;
        println!("-- slot {address}");
        for sample in samples {
            println!(
                "  {:04}-{:02} day {:>2} +{:>5}min  {:>8.1} W  {:.5} kWh",
                sample.timestamp.year,
                sample.timestamp.month,
                sample.timestamp.day,
                sample.timestamp.minutes,
                sample.watts,
                sample.kwh
            );
        }
    }

    Ok(())
}
