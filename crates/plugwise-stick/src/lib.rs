//! Plugwise Circle protocol backend.
//!
//! This crate implements the proprietary ASCII-hex framed protocol spoken
//! by Plugwise "Circle" smart plugs through the USB "Stick". It provides:
//!
//! - **Frame codec** ([`protocol`]) -- encode and decode CR-terminated
//!   frames with the `\x05\x05\x03\x03` header, CRC-16 checksum, and
//!   schema-driven fixed-width field splitting.
//! - **Command registry** ([`commands`]) -- the static table of command
//!   descriptors (request/response codes, field schemas) and the pure
//!   result parsers for each command kind.
//! - **Calibration arithmetic** ([`power`]) -- convert raw pulse counts
//!   into watts and kWh using per-device calibration coefficients.
//! - **Dispatcher** ([`dispatch`]) -- the background reader task enforcing
//!   the device's single-outstanding-command contract and correlating
//!   asynchronous ack/data frames back to their commands.
//! - **Device registry** ([`device`]) -- the address-keyed cache of relay
//!   state and calibration, shared between the dispatcher and handles.
//! - **Per-device handles** ([`circle`]) -- high-level operations
//!   (power on/off, info, calibration, power readings) on one Circle.
//! - **Stick** ([`stick`]) and **builder** ([`builder`]) -- connection
//!   lifecycle and fluent configuration.
//!
//! # Protocol shape
//!
//! Every exchange is initiated by the host. A command frame is answered
//! first by a generic ack (code `0000`) carrying an ack id and a subcode,
//! then -- for data-bearing commands -- by a response frame echoing that
//! ack id. Only one command may be outstanding at a time; the dispatcher
//! queues everything else.
//!
//! # Example
//!
//! ```
//! use plugwise_stick::protocol::encode_frame;
//!
//! // Build a "read calibration" frame for one Circle.
//! let mac = "000D6F0000B1B64B".parse().unwrap();
//! let frame = encode_frame("0026", Some(&mac), "");
//! assert!(frame.starts_with(b"\x05\x05\x03\x03"));
//! assert!(frame.ends_with(b"\r"));
//! ```

pub mod builder;
pub mod circle;
pub mod commands;
pub mod device;
pub mod dispatch;
pub mod power;
pub mod protocol;
pub mod stick;

pub use builder::StickBuilder;
pub use circle::CircleHandle;
pub use commands::{CircleResponse, CommandDescriptor, CommandKind, InfoResponse};
pub use device::{DeviceRegistry, DeviceState};
pub use stick::Stick;
