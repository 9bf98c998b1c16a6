//! Error types for the plugwise crates.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! device-reported errors are all captured here.

/// The error type for all plugwise operations.
///
/// Variants cover the failure modes encountered when talking to Circle
/// plugs through the Stick: physical transport failures, malformed or
/// unrecognized frames, device-reported ack errors, and the precondition
/// failures a read can hit before any frame is written.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/read/write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed frame, unexpected response shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device rejected or aborted a command via an ack subcode.
    #[error("device error: {0}")]
    Device(String),

    /// A power reading carried the all-F overflow sentinel instead of a
    /// pulse count. No calibration math was performed.
    #[error("unexpected pulse overflow")]
    PulseOverflow,

    /// A power reading was requested while the relay is known to be off.
    #[error("relay off")]
    RelayOff,

    /// A power reading was requested before calibration coefficients were
    /// fetched (or the last calibration reply failed to parse).
    #[error("no calibration data")]
    NoCalibration,

    /// Timed out waiting for a response from the device.
    ///
    /// Only produced when an explicit command timeout was configured; the
    /// protocol itself has no timeout and a lost response otherwise leaves
    /// the command pending forever.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the Stick has been established, or the dispatcher
    /// has shut down.
    #[error("not connected")]
    NotConnected,

    /// The connection to the Stick was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("short frame".into());
        assert_eq!(e.to_string(), "protocol error: short frame");
    }

    #[test]
    fn error_display_device() {
        let e = Error::Device("command aborted".into());
        assert_eq!(e.to_string(), "device error: command aborted");
    }

    #[test]
    fn error_display_preconditions() {
        assert_eq!(Error::RelayOff.to_string(), "relay off");
        assert_eq!(Error::NoCalibration.to_string(), "no calibration data");
        assert_eq!(Error::PulseOverflow.to_string(), "unexpected pulse overflow");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
