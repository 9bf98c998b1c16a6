//! # plugwise -- Circle smart-plug control for Rust
//!
//! `plugwise` is an asynchronous Rust library for controlling Plugwise
//! "Circle" energy-monitoring smart plugs through the Plugwise USB
//! "Stick". It covers relay switching, live power readings, calibration
//! handling, and the on-device historical power log.
//!
//! ## Quick start
//!
//! Add `plugwise` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! plugwise = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to the Stick and read a plug's power draw:
//!
//! ```no_run
//! use plugwise::StickBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let stick = StickBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     let circle = stick.circle(&"000D6F0000B1B64B".parse()?);
//!     circle.power_on().await?;
//!     let reading = circle.power_info().await?;
//!     println!("{:.1} W", reading.watts);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                   | Purpose                                      |
//! |-------------------------|----------------------------------------------|
//! | `plugwise-core`         | [`Transport`] trait, value types, errors     |
//! | `plugwise-transport`    | Serial transport for the Stick               |
//! | `plugwise-stick`        | Protocol codec, dispatcher, device handles   |
//! | `plugwise-test-harness` | Mock transport for protocol testing          |
//! | **`plugwise`**          | This facade crate -- re-exports everything   |
//!
//! ## Flow control
//!
//! The Stick accepts one command at a time. The driver queues everything
//! else and correlates each inbound ack and data frame back to the
//! command that caused it, so callers can issue operations concurrently
//! from multiple tasks; ordering on the wire stays strictly sequential.
//!
//! ## Preconditions
//!
//! Power readings need the plug's calibration coefficients and a closed
//! relay. [`CircleHandle::power_info`] resolves both before writing a
//! frame: it probes with an info read when the relay state is unknown,
//! fetches calibration when absent, and fails immediately with
//! [`Error::RelayOff`] when the relay is known open.

pub use plugwise_core::{
    CalibrationCoefficients, CircleClock, CircleMac, Error, LogTimestamp, ParseMacError,
    PowerBufferSample, PowerReading, RelayState, Result, Transport,
};
pub use plugwise_stick::{
    CircleHandle, CircleResponse, CommandDescriptor, CommandKind, DeviceRegistry, DeviceState,
    InfoResponse, Stick, StickBuilder,
};
pub use plugwise_transport::{SerialConfig, SerialTransport};

/// Protocol-level building blocks, for tooling that works below the
/// [`CircleHandle`] surface (frame inspection, emulators).
pub mod protocol {
    pub use plugwise_stick::protocol::{
        DecodedLine, FRAME_END, FRAME_START, checksum, decode_line, encode_frame,
    };
}

/// Pulse-to-power conversion, exposed for processing externally captured
/// pulse counts with cached calibration data.
pub mod power {
    pub use plugwise_stick::power::{PULSES_PER_KWH, pulse_correction, pulses_to_kwh, pulses_to_watt};
}
