//! StickBuilder -- fluent builder for constructing [`Stick`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! serial parameters and timeout policy before the transport is opened.
//!
//! # Example
//!
//! ```no_run
//! use plugwise_stick::StickBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> plugwise_core::Result<()> {
//! let stick = StickBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .command_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//!
//! let circle = stick.circle(&"000D6F0000B1B64B".parse().unwrap());
//! let info = circle.info().await?;
//! println!("relay: {}", info.relay_on);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use plugwise_core::error::{Error, Result};
use plugwise_core::transport::Transport;

use crate::stick::Stick;

/// Baud rate of the Stick's USB-serial bridge.
pub const STICK_BAUD_RATE: u32 = 115_200;

/// Fluent builder for [`Stick`].
pub struct StickBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    command_timeout: Option<Duration>,
    init_handshake: bool,
}

impl StickBuilder {
    pub fn new() -> Self {
        StickBuilder {
            serial_port: None,
            baud_rate: STICK_BAUD_RATE,
            command_timeout: None,
            init_handshake: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the baud rate (default: 115200, the Stick's fixed rate).
    /// Only useful against protocol emulators.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Bound how long a caller waits for a command's response.
    ///
    /// The protocol itself has no timeout: by default a command whose
    /// response is lost waits forever, and its dispatcher-side entry is
    /// never reclaimed. Setting a timeout bounds the caller's wait with
    /// [`Error::Timeout`](plugwise_core::Error::Timeout); the
    /// dispatcher-side entry still leaks, exactly as the device contract
    /// leaves it.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Enable or disable the init handshake sent on connect
    /// (default: enabled).
    pub fn init_handshake(mut self, enabled: bool) -> Self {
        self.init_handshake = enabled;
        self
    }

    /// Build a [`Stick`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a
    /// `MockTransport` from `plugwise-test-harness`) and for advanced use
    /// cases where the caller manages the transport lifecycle directly.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Stick> {
        Ok(Stick::new(
            transport,
            self.command_timeout,
            self.init_handshake,
        ))
    }

    /// Build a [`Stick`] over a serial transport.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<Stick> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::Transport("serial_port is required for build()".into()))?;

        let transport = plugwise_transport::SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for StickBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwise_test_harness::MockTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let builder = StickBuilder::new();
        assert_eq!(builder.baud_rate, STICK_BAUD_RATE);
        assert!(builder.command_timeout.is_none());
        assert!(builder.init_handshake);
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let mock = MockTransport::new();
        let stick = StickBuilder::new()
            .serial_port("/dev/ttyUSB0")
            .baud_rate(9600)
            .command_timeout(Duration::from_millis(250))
            .init_handshake(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let _ = stick;
    }

    #[tokio::test]
    async fn builder_serial_port_required_for_build() {
        let result = StickBuilder::new().build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn command_timeout_bounds_the_wait() {
        // A command whose response never arrives must resolve with a
        // timeout when (and only when) one was configured.
        let mut mock = MockTransport::new();
        mock.expect(
            &crate::protocol::encode_frame(
                crate::commands::descriptor(crate::commands::CommandKind::Info).request_code,
                Some(&"000D6F0000B1B64B".parse().unwrap()),
                "",
            ),
            &[],
        );

        let stick = StickBuilder::new()
            .command_timeout(Duration::from_millis(100))
            .init_handshake(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let circle = stick.circle(&"000D6F0000B1B64B".parse().unwrap());
        let result = circle.info().await;
        assert!(matches!(
            result,
            Err(plugwise_core::Error::Timeout)
        ));
    }
}
