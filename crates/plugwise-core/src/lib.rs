//! plugwise-core: Core traits, types, and error definitions for the
//! plugwise crates.
//!
//! This crate defines the abstractions shared by the protocol engine and
//! application code. Applications depend on these types without pulling in
//! the serial transport or the driver itself.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the Stick
//! - [`CircleMac`] -- a Circle's 16-hex-digit device address
//! - [`CalibrationCoefficients`] -- per-device pulse linearization floats
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use plugwise_core::*`.
pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
