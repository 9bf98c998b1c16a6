//! The dispatcher: flow control and ack correlation.
//!
//! The Stick enforces an implicit single-outstanding-command contract: a
//! new command may only be written once the previous one has been
//! acknowledged. This module owns that contract. A background reader task
//! holds the transport exclusively; commands arrive over an `mpsc`
//! channel, wait in a FIFO queue, and resolve through `oneshot`
//! continuations when their terminal response arrives.
//!
//! # Correlation
//!
//! The Stick assigns each accepted command an ack id, announced in a
//! generic ack frame (code `0000`, subcode `00C1`). Because only one
//! command is unacknowledged at a time, ids are paired with pending
//! commands in FIFO order; data frames then carry the id explicitly and
//! resolve the matching entry.
//!
//! # Flow control
//!
//! Two gates hold back the queue:
//!
//! - a debt counter, decremented on every send and paid back (clamped at
//!   zero) by every inbound ack -- negative debt means a command is
//!   unacknowledged;
//! - a response-seen flag, cleared on send, set by any decoded frame.
//!
//! Both conventions are preserved from the device's observed behavior.
//! There is no timeout here: a command whose response is lost stays
//! registered forever. Callers opting into a timeout bound only their own
//! wait (see [`StickBuilder::command_timeout`](crate::builder::StickBuilder::command_timeout)).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use plugwise_core::error::{Error, Result};
use plugwise_core::transport::Transport;
use plugwise_core::types::CircleMac;

use crate::commands::{self, CircleResponse, CommandKind};
use crate::device::DeviceRegistry;
use crate::protocol::{self, DecodedLine};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A command waiting in (or moving through) the dispatcher.
pub(crate) struct QueuedCommand {
    pub mac: Option<CircleMac>,
    pub kind: CommandKind,
    pub params: String,
    /// Set only on the connect handshake's init command, which the Stick
    /// may answer with an abort ack that must not fail it.
    pub exempt_from_abort: bool,
    pub response_tx: oneshot::Sender<Result<CircleResponse>>,
}

/// A request sent from a handle to the dispatcher task.
pub(crate) enum DispatchRequest {
    Enqueue(QueuedCommand),
}

/// Handle to the background dispatcher task.
pub(crate) struct DispatchHandle {
    pub cmd_tx: mpsc::Sender<DispatchRequest>,
    /// Kept so the task can be aborted when the Stick is dropped.
    #[allow(dead_code)]
    pub task_handle: JoinHandle<()>,
}

/// A command that has been written to the transport.
struct PendingCommand {
    mac: Option<CircleMac>,
    kind: CommandKind,
    exempt_from_abort: bool,
    response_tx: oneshot::Sender<Result<CircleResponse>>,
}

/// Where the dispatcher stands in the one-command-in-flight cycle.
/// Tracked for observability; the gates below are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Idle,
    AwaitingAck,
    AwaitingData,
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the background dispatcher task.
///
/// The task owns the transport exclusively. Commands are submitted via
/// the returned handle's `cmd_tx` channel and resolved through their
/// oneshot continuations.
pub(crate) fn spawn_dispatcher(
    transport: Box<dyn Transport>,
    registry: Arc<DeviceRegistry>,
) -> DispatchHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<DispatchRequest>(16);

    let task_handle = tokio::spawn(dispatcher_loop(transport, registry, cmd_rx));

    DispatchHandle {
        cmd_tx,
        task_handle,
    }
}

// ---------------------------------------------------------------------------
// Reader loop
// ---------------------------------------------------------------------------

/// The main loop of the dispatcher task.
///
/// Uses `tokio::select! { biased; }` to prioritize command submission
/// over idle reads; inbound bytes are buffered and drained line by line.
async fn dispatcher_loop(
    mut transport: Box<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    mut cmd_rx: mpsc::Receiver<DispatchRequest>,
) {
    let mut dispatcher = Dispatcher::new(registry);
    let mut line_buf: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            biased;

            // Priority: accept newly submitted commands.
            req = cmd_rx.recv() => {
                match req {
                    Some(DispatchRequest::Enqueue(cmd)) => {
                        trace!(kind = ?cmd.kind, queued = dispatcher.queue.len(), "command enqueued");
                        dispatcher.queue.push_back(cmd);
                        dispatcher.try_drain(&mut *transport).await;
                    }
                    None => {
                        // All senders dropped -- the Stick was dropped.
                        debug!("dispatch channel closed, exiting reader loop");
                        break;
                    }
                }
            }

            // Idle: read response bytes from the Stick.
            read = async {
                let mut buf = [0u8; 256];
                match transport.receive(&mut buf, Duration::from_millis(100)).await {
                    Ok(n) => Ok(buf[..n].to_vec()),
                    Err(e) => Err(e),
                }
            } => {
                match read {
                    Ok(bytes) if !bytes.is_empty() => {
                        line_buf.extend_from_slice(&bytes);
                        while let Some(line) = protocol::next_line(&mut line_buf) {
                            dispatcher.handle_line(&mut *transport, &line).await;
                        }
                    }
                    Ok(_) | Err(Error::Timeout) => {
                        // Nothing to read -- just loop back.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Err(e) => {
                        debug!(error = %e, "transport read failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher state machine
// ---------------------------------------------------------------------------

struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    /// Commands not yet written to the transport, FIFO.
    queue: VecDeque<QueuedCommand>,
    /// Commands written but not yet paired with an ack id, FIFO.
    sent: VecDeque<PendingCommand>,
    /// Commands paired with an ack id, awaiting their terminal response.
    registered: HashMap<String, PendingCommand>,
    /// Registration order of the ids in `registered`, oldest first.
    registration_order: Vec<String>,
    /// Send debt: goes one negative per send, paid back (clamped at zero)
    /// by every inbound ack.
    ack_debt: i32,
    /// Whether any frame has been observed since the last send.
    response_seen: bool,
    state: FlowState,
}

impl Dispatcher {
    fn new(registry: Arc<DeviceRegistry>) -> Self {
        Dispatcher {
            registry,
            queue: VecDeque::new(),
            sent: VecDeque::new(),
            registered: HashMap::new(),
            registration_order: Vec::new(),
            ack_debt: 0,
            // Nothing is in flight yet, so the first send is not gated.
            response_seen: true,
            state: FlowState::Idle,
        }
    }

    /// Decode and route one inbound line.
    ///
    /// Undecodable and unrecognized lines are logged and dropped with no
    /// effect on flow control.
    async fn handle_line(&mut self, transport: &mut dyn Transport, line: &str) {
        match protocol::decode_line(line) {
            Ok(DecodedLine::Frame { code, fields }) if code == commands::ACK_CODE => {
                self.handle_ack(transport, &fields).await;
            }
            Ok(DecodedLine::Frame { code, fields }) => {
                self.handle_data(transport, &code, fields).await;
            }
            Ok(DecodedLine::Unrecognized { code }) => {
                warn!(code, line, "unrecognized response code, dropping line");
            }
            Err(e) => {
                warn!(error = %e, line, "undecodable line, dropping");
            }
        }
    }

    /// Handle a generic ack frame: fields are the ack id and the subcode.
    async fn handle_ack(&mut self, transport: &mut dyn Transport, fields: &[String]) {
        let (ack_id, subcode) = match (fields.first(), fields.get(1)) {
            (Some(id), Some(sub)) => (id.as_str(), sub.as_str()),
            _ => {
                warn!(?fields, "ack frame missing fields, dropping");
                return;
            }
        };

        // Every ack pays back one unit of send debt, never above zero.
        self.ack_debt = (self.ack_debt + 1).min(0);
        self.response_seen = true;

        match subcode {
            commands::ACK_ACCEPTED => match self.sent.pop_front() {
                Some(pending) => {
                    debug!(ack_id, kind = ?pending.kind, "command accepted, awaiting data");
                    self.registration_order.push(ack_id.to_string());
                    self.registered.insert(ack_id.to_string(), pending);
                    self.state = FlowState::AwaitingData;
                }
                None => {
                    debug!(ack_id, "accepted ack with no unregistered command");
                }
            },
            commands::ACK_ABORTED => {
                // The Stick abandons the newest registered command, not
                // the one named by the ack id.
                match self.registration_order.last().cloned() {
                    Some(last_id) => {
                        let exempt = self
                            .registered
                            .get(&last_id)
                            .map(|p| p.exempt_from_abort)
                            .unwrap_or(false);
                        if exempt {
                            debug!(ack_id, "abort ack ignored for the init handshake");
                        } else if let Some(pending) = self.remove_registered(&last_id) {
                            warn!(ack_id, kind = ?pending.kind, "command aborted by stick");
                            deliver(pending, Err(Error::Device("command aborted".into())));
                        }
                    }
                    None => {
                        debug!(ack_id, "abort ack with nothing registered");
                    }
                }
            }
            commands::ACK_ERROR => {
                if let Some(pending) = self.remove_registered(ack_id) {
                    warn!(
                        ack_id,
                        kind = ?pending.kind,
                        mac = ?pending.mac.as_ref().map(|m| m.as_str()),
                        "device reported error"
                    );
                    deliver(
                        pending,
                        Err(Error::Device(format!("error ack for id {ack_id}"))),
                    );
                } else {
                    debug!(ack_id, "error ack with no matching command");
                }
            }
            _ => {
                // Default: the command completed without a data frame.
                if let Some(pending) = self.remove_registered(ack_id) {
                    debug!(ack_id, subcode, kind = ?pending.kind, "command completed with no data");
                    deliver(pending, Ok(CircleResponse::Ack));
                } else {
                    debug!(ack_id, subcode, "ack with no matching command");
                }
            }
        }

        self.settle_state();
        self.try_drain(transport).await;
    }

    /// Handle a data frame: fields are the ack id, the reporting Circle's
    /// address, and the payload.
    async fn handle_data(&mut self, transport: &mut dyn Transport, code: &str, fields: Vec<String>) {
        self.response_seen = true;

        let ack_id = match fields.first() {
            Some(id) => id.clone(),
            None => {
                warn!(code, "data frame missing ack id, dropping");
                return;
            }
        };

        match self.remove_registered(&ack_id) {
            Some(pending) => {
                let result = match fields.get(1).map(|f| f.parse::<CircleMac>()) {
                    Some(Ok(mac)) => self
                        .registry
                        .with_state(&mac, |state| {
                            commands::parse_response(pending.kind, state, &fields)
                        }),
                    Some(Err(e)) => Err(Error::Protocol(format!("bad address in response: {e}"))),
                    None => Err(Error::Protocol("response missing address field".into())),
                };

                if let Err(e) = &result {
                    debug!(code, ack_id, error = %e, "response parse failed");
                } else {
                    trace!(code, ack_id, kind = ?pending.kind, "response delivered");
                }
                deliver(pending, result);
            }
            None => {
                debug!(code, ack_id, "data frame with no matching command");
            }
        }

        self.settle_state();
        self.try_drain(transport).await;
    }

    /// Send the next queued command if the flow-control gates allow it.
    async fn try_drain(&mut self, transport: &mut dyn Transport) {
        if !transport.is_connected() {
            trace!("drain gated: transport not connected");
            return;
        }
        if !self.response_seen {
            trace!("drain gated: no response observed since last send");
            return;
        }
        if self.ack_debt < 0 {
            trace!(debt = self.ack_debt, "drain gated: unacknowledged command outstanding");
            return;
        }

        let Some(cmd) = self.queue.pop_front() else {
            return;
        };

        let desc = commands::descriptor(cmd.kind);
        let frame = protocol::encode_frame(desc.request_code, cmd.mac.as_ref(), &cmd.params);
        debug!(command = desc.name, mac = ?cmd.mac.as_ref().map(|m| m.as_str()), "sending command");

        match transport.send(&frame).await {
            Ok(()) => {
                self.ack_debt -= 1;
                self.response_seen = false;
                self.state = FlowState::AwaitingAck;
                self.sent.push_back(PendingCommand {
                    mac: cmd.mac,
                    kind: cmd.kind,
                    exempt_from_abort: cmd.exempt_from_abort,
                    response_tx: cmd.response_tx,
                });
            }
            Err(e) => {
                warn!(command = desc.name, error = %e, "failed to write frame");
                let _ = cmd.response_tx.send(Err(e));
            }
        }
    }

    fn remove_registered(&mut self, ack_id: &str) -> Option<PendingCommand> {
        let pending = self.registered.remove(ack_id)?;
        self.registration_order.retain(|id| id != ack_id);
        Some(pending)
    }

    fn settle_state(&mut self) {
        if self.sent.is_empty() && self.registered.is_empty() {
            if self.state != FlowState::Idle {
                trace!(from = ?self.state, "dispatcher idle");
            }
            self.state = FlowState::Idle;
        }
    }
}

/// Resolve a pending command's continuation. Receivers that gave up are
/// ignored; the send is fire-and-forget by design of oneshot.
fn deliver(pending: PendingCommand, result: Result<CircleResponse>) {
    let _ = pending.response_tx.send(result);
}
