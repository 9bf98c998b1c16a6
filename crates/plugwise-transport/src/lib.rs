//! Transport implementations for the plugwise crates.
//!
//! This crate provides the concrete [`Transport`](plugwise_core::Transport)
//! implementation for the Plugwise Stick's USB virtual COM port:
//!
//! - [`SerialTransport`]: the Stick's CP2103 USB-serial bridge, fixed at
//!   115200 baud, 8N1
//!
//! # Example
//!
//! ```no_run
//! use plugwise_transport::SerialTransport;
//! use plugwise_core::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> plugwise_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialTransport};
