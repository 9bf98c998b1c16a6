//! plugwise-test-harness: Mock transports for deterministic testing of
//! the protocol engine without a Stick attached.
//!
//! [`MockTransport`] pre-loads request/response exchanges and records
//! every frame written through it, so tests can drive the dispatcher and
//! assert on both the decoded results and the exact wire traffic.

pub mod mock_serial;

pub use mock_serial::MockTransport;
