//! Per-device handle for one Circle.
//!
//! A [`CircleHandle`] is a cheap, clonable facade over the dispatcher: it
//! enqueues commands for a single address and reads the shared device
//! registry to enforce preconditions without touching the transport.
//!
//! Handles for the same address -- however many times they are looked up
//! through [`Stick::circle`](crate::stick::Stick::circle) -- observe the
//! same cached relay state and calibration coefficients.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use plugwise_core::error::{Error, Result};
use plugwise_core::types::{
    CalibrationCoefficients, CircleClock, CircleMac, PowerBufferSample, PowerReading, RelayState,
};

use crate::commands::{self, CircleResponse, CommandKind, InfoResponse};
use crate::device::DeviceRegistry;
use crate::dispatch::{DispatchRequest, QueuedCommand};

/// A handle to one Circle smart plug.
///
/// All operations are asynchronous and resolve exactly once, when the
/// matching terminal response (data frame, bare ack, or device error)
/// arrives. Without a configured command timeout a lost response keeps
/// the call pending forever, matching the device protocol.
#[derive(Clone)]
pub struct CircleHandle {
    mac: CircleMac,
    cmd_tx: mpsc::Sender<DispatchRequest>,
    registry: Arc<DeviceRegistry>,
    command_timeout: Option<Duration>,
}

impl CircleHandle {
    pub(crate) fn new(
        mac: CircleMac,
        cmd_tx: mpsc::Sender<DispatchRequest>,
        registry: Arc<DeviceRegistry>,
        command_timeout: Option<Duration>,
    ) -> Self {
        CircleHandle {
            mac,
            cmd_tx,
            registry,
            command_timeout,
        }
    }

    /// The address this handle controls.
    pub fn mac(&self) -> &CircleMac {
        &self.mac
    }

    /// Cached relay state, `Unknown` until the first info or switch
    /// response.
    pub fn relay(&self) -> RelayState {
        self.registry.relay(&self.mac)
    }

    /// Cached log-buffer address from the last info response.
    pub fn log_address(&self) -> Option<u32> {
        self.registry.log_address(&self.mac)
    }

    /// Close the relay. Returns the relay state the device confirmed.
    pub async fn power_on(&self) -> Result<bool> {
        self.switch(true).await
    }

    /// Open the relay. Returns the relay state the device confirmed.
    pub async fn power_off(&self) -> Result<bool> {
        self.switch(false).await
    }

    async fn switch(&self, on: bool) -> Result<bool> {
        debug!(mac = %self.mac, on, "switching relay");
        match self
            .execute(CommandKind::Switch, commands::switch_params(on).to_string())
            .await?
        {
            CircleResponse::Switch { relay_on } => Ok(relay_on),
            other => Err(unexpected_response("switch", &other)),
        }
    }

    /// Read device status: relay state, on-board clock, log-buffer
    /// address, and mains frequency. Updates the shared cache.
    pub async fn info(&self) -> Result<InfoResponse> {
        debug!(mac = %self.mac, "reading info");
        match self.execute(CommandKind::Info, String::new()).await? {
            CircleResponse::Info(info) => Ok(info),
            other => Err(unexpected_response("info", &other)),
        }
    }

    /// Fetch and cache the device's calibration coefficients.
    ///
    /// Returns `Ok(None)` when the device's reply failed to parse; the
    /// cache is left unset and power reads keep failing with
    /// [`Error::NoCalibration`] until a later fetch succeeds.
    pub async fn calibration(&self) -> Result<Option<CalibrationCoefficients>> {
        debug!(mac = %self.mac, "reading calibration");
        match self.execute(CommandKind::Calibration, String::new()).await? {
            CircleResponse::Calibration(calibration) => Ok(calibration),
            other => Err(unexpected_response("calibration", &other)),
        }
    }

    /// Read instantaneous power.
    ///
    /// Preconditions are resolved before any frame is written: with the
    /// relay known off this fails immediately with [`Error::RelayOff`];
    /// with the relay state unknown an info read runs first and the
    /// request is retried once against the now-known state; missing
    /// calibration is fetched on the way.
    pub async fn power_info(&self) -> Result<PowerReading> {
        match self.relay() {
            RelayState::Off => Err(Error::RelayOff),
            RelayState::On => self.power_info_calibrated().await,
            RelayState::Unknown => {
                debug!(mac = %self.mac, "relay state unknown, probing with info first");
                self.info().await?;
                match self.relay() {
                    RelayState::Off => Err(Error::RelayOff),
                    _ => self.power_info_calibrated().await,
                }
            }
        }
    }

    async fn power_info_calibrated(&self) -> Result<PowerReading> {
        self.ensure_calibration().await?;
        debug!(mac = %self.mac, "reading power");
        match self.execute(CommandKind::PowerInfo, String::new()).await? {
            CircleResponse::Power(reading) => Ok(reading),
            other => Err(unexpected_response("powerinfo", &other)),
        }
    }

    /// Read one four-sample page of the on-device power log.
    ///
    /// `log_address` is the logical slot index as reported by
    /// [`info`](Self::info) (see [`log_address`](Self::log_address)).
    /// Requires calibration, fetched on the way if absent.
    pub async fn power_buffer_info(&self, log_address: u32) -> Result<Vec<PowerBufferSample>> {
        self.ensure_calibration().await?;
        debug!(mac = %self.mac, log_address, "reading power buffer");
        match self
            .execute(
                CommandKind::PowerBufferInfo,
                commands::log_address_params(log_address),
            )
            .await?
        {
            CircleResponse::PowerBuffer(samples) => Ok(samples),
            other => Err(unexpected_response("powerbufferinfo", &other)),
        }
    }

    /// Set the device's on-board clock.
    pub async fn set_clock(&self, clock: &CircleClock) -> Result<()> {
        debug!(mac = %self.mac, %clock, "setting clock");
        self.execute(CommandKind::SetClock, commands::clock_params(clock))
            .await?;
        Ok(())
    }

    /// Restart the device.
    pub async fn restart(&self) -> Result<()> {
        debug!(mac = %self.mac, "restarting");
        self.execute(CommandKind::Restart, String::new()).await?;
        Ok(())
    }

    /// Fetch calibration if the cache is empty; fail with
    /// [`Error::NoCalibration`] if it is still empty afterwards (the
    /// device replied but the coefficients did not parse).
    async fn ensure_calibration(&self) -> Result<()> {
        if self.registry.calibration(&self.mac).is_none() {
            self.calibration().await?;
            if self.registry.calibration(&self.mac).is_none() {
                return Err(Error::NoCalibration);
            }
        }
        Ok(())
    }

    /// Enqueue one command for this address and await its terminal
    /// response, bounded by the configured command timeout if any.
    async fn execute(&self, kind: CommandKind, params: String) -> Result<CircleResponse> {
        let (response_tx, response_rx) = oneshot::channel();

        self.cmd_tx
            .send(DispatchRequest::Enqueue(QueuedCommand {
                mac: Some(self.mac.clone()),
                kind,
                params,
                exempt_from_abort: false,
                response_tx,
            }))
            .await
            .map_err(|_| Error::NotConnected)?;

        match self.command_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, response_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(Error::NotConnected), // oneshot sender dropped
                Err(_) => Err(Error::Timeout),          // configured timeout elapsed
            },
            None => response_rx.await.map_err(|_| Error::NotConnected)?,
        }
    }
}

impl std::fmt::Debug for CircleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircleHandle")
            .field("mac", &self.mac)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

fn unexpected_response(command: &str, response: &CircleResponse) -> Error {
    Error::Protocol(format!(
        "unexpected response variant for {command}: {response:?}"
    ))
}
