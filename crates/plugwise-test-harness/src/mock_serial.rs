//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response exchanges. This lets you test frame encoding, the
//! dispatcher's flow control, and response parsing without real hardware.
//!
//! Because one Plugwise command typically produces two inbound lines (the
//! generic ack, then the data frame), each expectation carries the full
//! byte sequence the Stick would emit. The transport usually moves into
//! the dispatcher task, so the log of sent frames is shared behind an
//! `Arc` handle obtained up front via [`MockTransport::sent_log`].
//!
//! # Example
//!
//! ```
//! use plugwise_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends this request, return an ack and a data frame.
//! mock.expect_lines(
//!     b"\x05\x05\x03\x030023000D6F0000B1B64B1234\r",
//!     &["000012AB00C1", "002412AB000D6F0000B1B64B0D0604B000044C200185"],
//! );
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugwise_core::error::{Error, Result};
use plugwise_core::transport::Transport;

/// A pre-loaded request/response exchange.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return from subsequent `receive()` calls.
    response: Vec<u8>,
}

/// Shared log of every frame written through a [`MockTransport`].
pub type SentLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// A mock [`Transport`] for testing the protocol engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the
/// corresponding response bytes are then drained by `receive()` calls.
/// With no pending response, `receive()` times out like an idle serial
/// port would.
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/response exchanges.
    expectations: VecDeque<Expectation>,
    /// Bytes pending delivery through `receive()`.
    pending: VecDeque<u8>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all frames sent through this transport, shared so tests can
    /// inspect it after the transport has moved into the dispatcher task.
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending: VecDeque::new(),
            connected: true,
            sent_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add an expected request/response exchange with raw response bytes.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expected request answered by the given frames, each
    /// terminated with CRLF as the Stick terminates its lines.
    pub fn expect_lines(&mut self, request: &[u8], response_lines: &[&str]) {
        let mut response = Vec::new();
        for line in response_lines {
            response.extend_from_slice(line.as_bytes());
            response.extend_from_slice(b"\r\n");
        }
        self.expect(request, &response);
    }

    /// Queue inbound bytes unprompted, as if the Stick had spoken first.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    /// Queue an inbound CRLF-terminated line unprompted.
    pub fn inject_line(&mut self, line: &str) {
        self.inject(line.as_bytes());
        self.inject(b"\r\n");
    }

    /// A shared handle to the log of sent frames.
    ///
    /// Clone this before handing the transport to the dispatcher.
    pub fn sent_log(&self) -> SentLog {
        Arc::clone(&self.sent_log)
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log
            .lock()
            .expect("sent log poisoned")
            .push(data.to_vec());

        // Match against the next expectation.
        if let Some(expectation) = self.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            self.pending.extend(expectation.response);
            Ok(())
        } else {
            Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ))
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if self.pending.is_empty() {
            return Err(Error::Timeout);
        }

        let n = self.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_send_receive() {
        let mut mock = MockTransport::new();
        let request = b"\x05\x05\x03\x030023AAAA\r";
        mock.expect_lines(request, &["000012AB00C1"]);

        mock.send(request).await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"000012AB00C1\r\n");
    }

    #[tokio::test]
    async fn tracks_sent_frames() {
        let mut mock = MockTransport::new();
        let log = mock.sent_log();
        mock.expect(b"\x01\x02", &[]);
        mock.expect(b"\x03\x04", &[]);

        mock.send(b"\x01\x02").await.unwrap();
        mock.send(b"\x03\x04").await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"\x01\x02");
        assert_eq!(log[1], b"\x03\x04");
    }

    #[tokio::test]
    async fn wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"\x01", &[0xFF]);

        let result = mock.send(b"\x99").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn no_expectations_errors() {
        let mut mock = MockTransport::new();

        let result = mock.send(b"\x01").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn receive_without_send_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test]
    async fn injected_lines_arrive_unprompted() {
        let mut mock = MockTransport::new();
        mock.inject_line("000012AB00C1");

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"000012AB00C1\r\n");
    }

    #[tokio::test]
    async fn partial_receive() {
        let mut mock = MockTransport::new();
        mock.inject(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = [0u8; 2];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);

        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(b"\x01").await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn remaining_expectations_counts_down() {
        let mut mock = MockTransport::new();
        mock.expect(b"\x01", &[0xFF]);
        mock.expect(b"\x02", &[0xFE]);
        assert_eq!(mock.remaining_expectations(), 2);

        mock.send(b"\x01").await.unwrap();
        assert_eq!(mock.remaining_expectations(), 1);

        mock.send(b"\x02").await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }
}
