//! The Stick: connection owner and device lookup.
//!
//! A [`Stick`] owns the dispatcher task for one serial channel and the
//! [`DeviceRegistry`] every handle shares. It is constructed through
//! [`StickBuilder`](crate::builder::StickBuilder).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use plugwise_core::transport::Transport;
use plugwise_core::types::CircleMac;

use crate::circle::CircleHandle;
use crate::commands::CommandKind;
use crate::device::DeviceRegistry;
use crate::dispatch::{self, DispatchRequest, QueuedCommand};

/// A connected Plugwise Stick.
///
/// Once the Stick and every [`CircleHandle`] cloned from it are dropped,
/// the command channel closes and the dispatcher task exits; commands
/// still pending at that point resolve with
/// [`Error::NotConnected`](plugwise_core::Error::NotConnected).
pub struct Stick {
    cmd_tx: mpsc::Sender<DispatchRequest>,
    registry: Arc<DeviceRegistry>,
    command_timeout: Option<Duration>,
    /// Kept so the dispatcher can be aborted when the Stick is dropped.
    #[allow(dead_code)]
    task_handle: JoinHandle<()>,
}

impl Stick {
    /// Spawn the dispatcher over `transport` and, unless disabled,
    /// fire the init handshake. Called by the builder.
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        command_timeout: Option<Duration>,
        init_handshake: bool,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let handle = dispatch::spawn_dispatcher(transport, Arc::clone(&registry));

        let stick = Stick {
            cmd_tx: handle.cmd_tx,
            registry,
            command_timeout,
            task_handle: handle.task_handle,
        };

        if init_handshake {
            stick.send_init();
        }

        stick
    }

    /// Fire the init handshake without waiting for it.
    ///
    /// The outcome is only logged: the original protocol treats init as
    /// fire-and-forget, and the Stick may answer it with an abort ack
    /// that the dispatcher is told to ignore.
    fn send_init(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        let request = DispatchRequest::Enqueue(QueuedCommand {
            mac: None,
            kind: CommandKind::Init,
            params: String::new(),
            exempt_from_abort: true,
            response_tx,
        });

        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            if cmd_tx.send(request).await.is_err() {
                debug!("dispatcher gone before the init handshake");
                return;
            }
            match response_rx.await {
                Ok(Ok(_)) => debug!("stick init handshake complete"),
                Ok(Err(e)) => warn!(error = %e, "stick init handshake failed"),
                Err(_) => debug!("init handshake response dropped"),
            }
        });
    }

    /// Look up the handle for one Circle.
    ///
    /// Idempotent: the registry entry for `mac` is created on first
    /// lookup, and every handle returned for the same address shares the
    /// cached relay state and calibration.
    pub fn circle(&self, mac: &CircleMac) -> CircleHandle {
        // Materialize the registry entry so repeated lookups share state
        // from the start.
        self.registry.with_state(mac, |_| ());

        CircleHandle::new(
            mac.clone(),
            self.cmd_tx.clone(),
            Arc::clone(&self.registry),
            self.command_timeout,
        )
    }

    /// The shared device registry.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }
}

impl std::fmt::Debug for Stick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stick")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
