//! Per-device cached state and the registry that owns it.
//!
//! The registry is the single owner of everything the driver learns about
//! each Circle: relay state, calibration coefficients, the on-board clock,
//! and the log-buffer address. The dispatcher's result parsers write into
//! it; [`CircleHandle`](crate::circle::CircleHandle)s read from it to
//! enforce preconditions without a round trip.
//!
//! Entries are created on first lookup and never evicted: the cache is
//! long-lived by design, so every handle for one address observes the same
//! state for the life of the process.

use std::collections::HashMap;
use std::sync::Mutex;

use plugwise_core::types::{CalibrationCoefficients, CircleClock, CircleMac, RelayState};

/// Everything known about one Circle.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub mac: CircleMac,
    /// Unknown until the first successful info or switch response.
    pub relay: RelayState,
    /// Unset until a calibration response parses successfully.
    pub calibration: Option<CalibrationCoefficients>,
    /// On-board clock from the last info response.
    pub clock: Option<CircleClock>,
    /// Logical start address of the on-device log buffer, from the last
    /// info response.
    pub log_address: Option<u32>,
}

impl DeviceState {
    fn new(mac: CircleMac) -> Self {
        DeviceState {
            mac,
            relay: RelayState::Unknown,
            calibration: None,
            clock: None,
            log_address: None,
        }
    }
}

/// Address-keyed registry of [`DeviceState`].
///
/// Shared between the dispatcher task (which mutates state while parsing
/// responses) and every handle (which reads cached state). The lock is a
/// plain mutex; it is never held across an await point.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<CircleMac, DeviceState>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached relay state, `Unknown` for an address never seen.
    pub fn relay(&self, mac: &CircleMac) -> RelayState {
        self.devices
            .lock()
            .expect("device registry poisoned")
            .get(mac)
            .map(|d| d.relay)
            .unwrap_or_default()
    }

    /// Cached calibration coefficients, if a calibration response for the
    /// address has parsed successfully.
    pub fn calibration(&self, mac: &CircleMac) -> Option<CalibrationCoefficients> {
        self.devices
            .lock()
            .expect("device registry poisoned")
            .get(mac)
            .and_then(|d| d.calibration)
    }

    /// Cached log-buffer address from the last info response.
    pub fn log_address(&self, mac: &CircleMac) -> Option<u32> {
        self.devices
            .lock()
            .expect("device registry poisoned")
            .get(mac)
            .and_then(|d| d.log_address)
    }

    /// Cached on-board clock from the last info response.
    pub fn clock(&self, mac: &CircleMac) -> Option<CircleClock> {
        self.devices
            .lock()
            .expect("device registry poisoned")
            .get(mac)
            .and_then(|d| d.clock)
    }

    /// Copy of the full state for an address, if it has been looked up.
    pub fn snapshot(&self, mac: &CircleMac) -> Option<DeviceState> {
        self.devices
            .lock()
            .expect("device registry poisoned")
            .get(mac)
            .cloned()
    }

    /// Run `f` with mutable access to the state for `mac`, creating the
    /// entry on first lookup.
    pub(crate) fn with_state<R>(&self, mac: &CircleMac, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let mut devices = self.devices.lock().expect("device registry poisoned");
        let state = devices
            .entry(mac.clone())
            .or_insert_with(|| DeviceState::new(mac.clone()));
        f(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> CircleMac {
        "000D6F0000B1B64B".parse().unwrap()
    }

    #[test]
    fn unseen_address_reads_as_defaults() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.relay(&mac()), RelayState::Unknown);
        assert!(registry.calibration(&mac()).is_none());
        assert!(registry.log_address(&mac()).is_none());
        assert!(registry.snapshot(&mac()).is_none());
    }

    #[test]
    fn with_state_creates_entry_once() {
        let registry = DeviceRegistry::new();
        registry.with_state(&mac(), |state| {
            assert_eq!(state.relay, RelayState::Unknown);
            state.relay = RelayState::On;
        });
        // Second lookup sees the mutation, not a fresh entry.
        registry.with_state(&mac(), |state| {
            assert_eq!(state.relay, RelayState::On);
        });
        assert_eq!(registry.relay(&mac()), RelayState::On);
    }

    #[test]
    fn state_is_shared_per_address() {
        let registry = DeviceRegistry::new();
        let cal = CalibrationCoefficients {
            gain_a: 1.0,
            gain_b: 0.0,
            off_tot: 0.0,
            off_noise: 0.0,
        };
        registry.with_state(&mac(), |state| state.calibration = Some(cal));

        let other: CircleMac = "000D6F0000C2C75C".parse().unwrap();
        assert!(registry.calibration(&mac()).is_some());
        assert!(registry.calibration(&other).is_none());
    }
}
