//! Command registry and response parsers.
//!
//! Commands are described as data: each [`CommandDescriptor`] names its
//! request and response codes and the fixed-width field schema of the
//! response. One generic splitter in [`protocol`](crate::protocol)
//! consumes the schemas; the per-command result parsing lives in
//! [`parse_response`], a pure function dispatched on [`CommandKind`].
//!
//! Field 0 of every response is the ack id assigned by the Stick; field 1
//! is the reporting Circle's address (or, on the generic ack, the outcome
//! subcode). Payload fields follow.
//!
//! All parsers are pure except for their writes into the passed
//! [`DeviceState`] -- the relay, clock, log-address, and calibration
//! caches are updated as a side effect of parsing, exactly once per
//! response.

use tracing::warn;

use plugwise_core::error::{Error, Result};
use plugwise_core::types::{
    CalibrationCoefficients, CircleClock, LogTimestamp, PowerBufferSample, PowerReading, RelayState,
};

use crate::device::DeviceState;
use crate::power;

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

/// Response code of the generic ack frame.
pub const ACK_CODE: &str = "0000";

/// Ack subcode: command accepted, a data frame will follow.
pub const ACK_ACCEPTED: &str = "00C1";

/// Ack subcode: the Stick abandoned the newest registered command.
///
/// Inferred device quirk; observed when the Stick drops a command it
/// already accepted. Preserved literally.
pub const ACK_ABORTED: &str = "00C2";

/// Ack subcode: the device reported an explicit error for the command
/// registered under the ack id. Inferred device quirk; preserved literally.
pub const ACK_ERROR: &str = "00E1";

/// Relay-status field value meaning "relay closed" in an info response.
pub const RELAY_ON_FIELD: &str = "01";

/// Relay code meaning "relay closed" in a switch response.
pub const RELAY_ON_CODE: &str = "00D8";

/// Mains-frequency field value meaning 50 Hz in an info response.
pub const HERTZ_50_FIELD: &str = "85";

/// Sentinel an overflowed eight-second pulse counter reports instead of a
/// count.
pub const PULSE_OVERFLOW_SENTINEL: &str = "FFFF";

/// Raw address of the first log-buffer slot in device memory.
pub const LOG_BUFFER_BASE: u32 = 278_528;

/// Size of one log-buffer slot in device memory.
pub const LOG_BUFFER_STEP: u32 = 32;

/// Measurement window of the live pulse counter, in seconds.
const PULSE_WINDOW_SECS: f64 = 8.0;

/// Target window pulse counts are rescaled to before unit conversion.
const ONE_HOUR_SECS: f64 = 3600.0;

const MINUTES_PER_DAY: u32 = 1440;

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// The command a pending entry was created for; dispatches result parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Info,
    Calibration,
    PowerInfo,
    PowerBufferInfo,
    Switch,
    SetClock,
    Restart,
    Init,
}

/// Static description of one protocol command.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub kind: CommandKind,
    /// Four-hex-character request code.
    pub request_code: &'static str,
    /// Four-hex-character response code.
    pub response_code: &'static str,
    /// Fixed field widths of the response, after the response code.
    /// Trailing frame characters (the checksum) fall outside the schema.
    pub field_widths: &'static [usize],
}

static INFO: CommandDescriptor = CommandDescriptor {
    name: "info",
    kind: CommandKind::Info,
    request_code: "0023",
    response_code: "0024",
    // ackid, mac, year, month, minutes, log buffer address, relay, hertz
    field_widths: &[4, 16, 2, 2, 4, 8, 2, 2],
};

static CALIBRATION: CommandDescriptor = CommandDescriptor {
    name: "calibration",
    kind: CommandKind::Calibration,
    request_code: "0026",
    response_code: "0027",
    // ackid, mac, gain_a, gain_b, off_tot, off_noise
    field_widths: &[4, 16, 8, 8, 8, 8],
};

static POWER_INFO: CommandDescriptor = CommandDescriptor {
    name: "powerinfo",
    kind: CommandKind::PowerInfo,
    request_code: "0012",
    response_code: "0013",
    // ackid, mac, pulses 1s, pulses 8s, pulses total, reserved x3
    field_widths: &[4, 16, 4, 4, 8, 4, 4, 4],
};

static POWER_BUFFER_INFO: CommandDescriptor = CommandDescriptor {
    name: "powerbufferinfo",
    kind: CommandKind::PowerBufferInfo,
    request_code: "0048",
    response_code: "0049",
    // ackid, mac, 4 x (timestamp, pulses), log address echo
    field_widths: &[4, 16, 8, 8, 8, 8, 8, 8, 8, 8, 8],
};

static SET_CLOCK: CommandDescriptor = CommandDescriptor {
    name: "setclock",
    kind: CommandKind::SetClock,
    request_code: "0016",
    response_code: "0011",
    field_widths: &[4, 16],
};

static RESTART: CommandDescriptor = CommandDescriptor {
    name: "restart",
    kind: CommandKind::Restart,
    request_code: "0008",
    response_code: "0011",
    field_widths: &[4, 16, 2, 2, 16, 4, 2, 4],
};

static INIT: CommandDescriptor = CommandDescriptor {
    name: "init",
    kind: CommandKind::Init,
    request_code: "000A",
    response_code: "0011",
    // ackid, mac, then stick network status fields
    field_widths: &[4, 16, 2, 2, 16, 4, 2, 4],
};

static SWITCH: CommandDescriptor = CommandDescriptor {
    name: "switch",
    kind: CommandKind::Switch,
    request_code: "0017",
    response_code: "0018",
    // ackid, mac, relay code
    field_widths: &[4, 16, 4],
};

/// All command descriptors, in registry order. Later entries win when
/// response codes collide (setclock/restart/init all answer with `0011`).
pub static DESCRIPTORS: [&CommandDescriptor; 8] = [
    &INFO,
    &CALIBRATION,
    &POWER_INFO,
    &POWER_BUFFER_INFO,
    &SET_CLOCK,
    &RESTART,
    &INIT,
    &SWITCH,
];

/// Field widths of the generic ack: ack id, subcode.
static ACK_FIELD_WIDTHS: [usize; 2] = [4, 4];

/// Look up the descriptor for a command kind.
pub fn descriptor(kind: CommandKind) -> &'static CommandDescriptor {
    match kind {
        CommandKind::Info => &INFO,
        CommandKind::Calibration => &CALIBRATION,
        CommandKind::PowerInfo => &POWER_INFO,
        CommandKind::PowerBufferInfo => &POWER_BUFFER_INFO,
        CommandKind::Switch => &SWITCH,
        CommandKind::SetClock => &SET_CLOCK,
        CommandKind::Restart => &RESTART,
        CommandKind::Init => &INIT,
    }
}

/// Look up the field schema for an inbound response code.
///
/// Returns `None` for codes with no registered schema; the caller drops
/// the line.
pub fn response_schema(code: &str) -> Option<&'static [usize]> {
    if code == ACK_CODE {
        return Some(&ACK_FIELD_WIDTHS);
    }
    DESCRIPTORS
        .iter()
        .rev()
        .find(|d| d.response_code == code)
        .map(|d| d.field_widths)
}

// ---------------------------------------------------------------------------
// Request parameter builders
// ---------------------------------------------------------------------------

/// Switch command payload for the requested relay state.
pub fn switch_params(on: bool) -> &'static str {
    if on { "01" } else { "00" }
}

/// Power-buffer request payload: the raw device-memory address of the
/// requested log slot, from its logical index.
pub fn log_address_params(logical: u32) -> String {
    let raw = logical
        .saturating_mul(LOG_BUFFER_STEP)
        .saturating_add(LOG_BUFFER_BASE);
    format!("{raw:08X}")
}

/// Set-clock payload: year, month, and minutes-into-month, hex-packed as
/// the inverse of the info clock decode.
pub fn clock_params(clock: &CircleClock) -> String {
    format!(
        "{:02X}{:02X}{:04X}",
        clock.year.saturating_sub(2000) as u8,
        clock.month,
        clock.minutes
    )
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Decoded payload of an info response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoResponse {
    pub relay_on: bool,
    pub clock: CircleClock,
    /// Logical start address of the device's log buffer.
    pub log_address: u32,
    /// Mains frequency, 50 or 60.
    pub hertz: u8,
}

/// A parsed terminal response, delivered to the command's continuation.
#[derive(Debug, Clone, PartialEq)]
pub enum CircleResponse {
    /// Bare success: a no-data ack, or a response kind with no payload.
    Ack,
    Info(InfoResponse),
    /// `None` when the device's reply failed to parse; the coefficient
    /// cache is left unset and dependent reads keep failing until a later
    /// calibration request succeeds.
    Calibration(Option<CalibrationCoefficients>),
    Power(PowerReading),
    PowerBuffer(Vec<PowerBufferSample>),
    Switch { relay_on: bool },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn field<'a>(fields: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    fields
        .get(index)
        .map(|s| s.as_str())
        .ok_or_else(|| Error::Protocol(format!("response missing {name} field")))
}

fn hex_u32(value: &str, name: &str) -> Result<u32> {
    u32::from_str_radix(value, 16)
        .map_err(|e| Error::Protocol(format!("invalid {name} field {value:?}: {e}")))
}

/// Reinterpret an 8-hex-character field as a big-endian IEEE-754 f32.
fn hex_f32(value: &str, name: &str) -> Result<f32> {
    Ok(f32::from_bits(hex_u32(value, name)?))
}

/// Parse a response's payload fields for the command that caused it.
///
/// `state` is the device state for the address carried in the frame;
/// relay, clock, log-address, and calibration caches are updated here.
pub fn parse_response(
    kind: CommandKind,
    state: &mut DeviceState,
    fields: &[String],
) -> Result<CircleResponse> {
    match kind {
        CommandKind::Info => parse_info(state, fields),
        CommandKind::Calibration => parse_calibration(state, fields),
        CommandKind::PowerInfo => parse_power_info(state, fields),
        CommandKind::PowerBufferInfo => parse_power_buffer(state, fields),
        CommandKind::Switch => parse_switch(state, fields),
        CommandKind::SetClock | CommandKind::Restart | CommandKind::Init => Ok(CircleResponse::Ack),
    }
}

fn parse_info(state: &mut DeviceState, fields: &[String]) -> Result<CircleResponse> {
    let year = hex_u32(field(fields, 2, "year")?, "year")? as u16 + 2000;
    let month = hex_u32(field(fields, 3, "month")?, "month")? as u8;
    let minutes = hex_u32(field(fields, 4, "minutes")?, "minutes")? as u16;
    let raw_address = hex_u32(
        field(fields, 5, "log buffer address")?,
        "log buffer address",
    )?;
    let relay_on = field(fields, 6, "relay status")? == RELAY_ON_FIELD;
    let hertz = if field(fields, 7, "hertz")? == HERTZ_50_FIELD {
        50
    } else {
        60
    };

    let clock = CircleClock {
        year,
        month,
        minutes,
    };
    let log_address = raw_address.saturating_sub(LOG_BUFFER_BASE) / LOG_BUFFER_STEP;

    state.relay = if relay_on {
        RelayState::On
    } else {
        RelayState::Off
    };
    state.clock = Some(clock);
    state.log_address = Some(log_address);

    Ok(CircleResponse::Info(InfoResponse {
        relay_on,
        clock,
        log_address,
        hertz,
    }))
}

fn parse_calibration(state: &mut DeviceState, fields: &[String]) -> Result<CircleResponse> {
    let parsed: Result<CalibrationCoefficients> = (|| {
        Ok(CalibrationCoefficients {
            gain_a: hex_f32(field(fields, 2, "gain A")?, "gain A")?,
            gain_b: hex_f32(field(fields, 3, "gain B")?, "gain B")?,
            off_tot: hex_f32(field(fields, 4, "total offset")?, "total offset")?,
            off_noise: hex_f32(field(fields, 5, "noise offset")?, "noise offset")?,
        })
    })();

    match parsed {
        Ok(calibration) => {
            state.calibration = Some(calibration);
            Ok(CircleResponse::Calibration(Some(calibration)))
        }
        Err(e) => {
            warn!(mac = %state.mac, error = %e, "calibration response failed to parse; coefficients left unset");
            Ok(CircleResponse::Calibration(None))
        }
    }
}

fn parse_power_info(state: &mut DeviceState, fields: &[String]) -> Result<CircleResponse> {
    let pulses_8s = field(fields, 3, "eight-second pulse count")?;
    if pulses_8s == PULSE_OVERFLOW_SENTINEL {
        return Err(Error::PulseOverflow);
    }

    let calibration = state.calibration.ok_or(Error::NoCalibration)?;
    let raw = hex_u32(pulses_8s, "eight-second pulse count")? as f64;

    let pulses = power::pulse_correction(
        raw,
        PULSE_WINDOW_SECS,
        ONE_HOUR_SECS,
        calibration.gain_a as f64,
        calibration.gain_b as f64,
        calibration.off_tot as f64,
        calibration.off_noise as f64,
    );

    Ok(CircleResponse::Power(PowerReading {
        watts: power::pulses_to_watt(pulses),
        kwh: power::pulses_to_kwh(pulses),
        pulses,
    }))
}

fn parse_log_timestamp(stamp: &str) -> Result<LogTimestamp> {
    let split = (stamp.get(0..2), stamp.get(2..4), stamp.get(4..8));
    let (year_byte, month_byte, minute_chars) = match split {
        (Some(y), Some(m), Some(min)) if stamp.len() == 8 => (y, m, min),
        _ => {
            return Err(Error::Protocol(format!(
                "malformed log timestamp field: {stamp:?}"
            )));
        }
    };

    let year = hex_u32(year_byte, "log year")? as u16 + 2000;
    // The month byte is one-based on the wire; stored zero-based per the
    // device clock epoch.
    let month = (hex_u32(month_byte, "log month")? as u8).saturating_sub(1);
    let minutes = hex_u32(minute_chars, "log minutes")?;
    let day = minutes.div_ceil(MINUTES_PER_DAY) as u16;

    Ok(LogTimestamp {
        year,
        month,
        day,
        minutes,
    })
}

fn parse_power_buffer(state: &mut DeviceState, fields: &[String]) -> Result<CircleResponse> {
    let calibration = state.calibration.ok_or(Error::NoCalibration)?;

    let mut samples = Vec::with_capacity(4);
    for i in 0..4 {
        let timestamp = parse_log_timestamp(field(fields, 2 + i * 2, "log timestamp")?)?;
        let raw = hex_u32(field(fields, 3 + i * 2, "log pulse count")?, "log pulse count")? as f64;

        let pulses = power::pulse_correction(
            raw,
            PULSE_WINDOW_SECS,
            ONE_HOUR_SECS,
            calibration.gain_a as f64,
            calibration.gain_b as f64,
            calibration.off_tot as f64,
            calibration.off_noise as f64,
        );

        samples.push(PowerBufferSample {
            timestamp,
            watts: power::pulses_to_watt(pulses),
            kwh: power::pulses_to_kwh(pulses),
            pulses,
        });
    }

    Ok(CircleResponse::PowerBuffer(samples))
}

fn parse_switch(state: &mut DeviceState, fields: &[String]) -> Result<CircleResponse> {
    let relay_on = field(fields, 2, "relay code")? == RELAY_ON_CODE;

    state.relay = if relay_on {
        RelayState::On
    } else {
        RelayState::Off
    };

    Ok(CircleResponse::Switch { relay_on })
}
