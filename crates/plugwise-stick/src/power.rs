//! Pulse-to-power calibration arithmetic.
//!
//! A Circle reports raw pulse counts proportional to instantaneous power
//! draw. Converting a count into real units takes two steps:
//!
//! 1. [`pulse_correction`] linearizes the count using the device's four
//!    calibration coefficients and rescales it from the measurement window
//!    (8 seconds for live readings) to a one-hour window.
//! 2. [`pulses_to_watt`] / [`pulses_to_kwh`] divide the corrected one-hour
//!    count by the fixed pulses-per-kWh constant of the metering hardware.
//!
//! All functions are pure; the coefficients come from the per-device
//! calibration response cached in the device registry.

/// Pulses per kWh of the Circle's metering hardware. Device-specific and
/// exact; never adjust it.
pub const PULSES_PER_KWH: f64 = 468.9385193;

/// Linearize a raw pulse count and rescale it to a target window.
///
/// With `rate = pulses / source_window_secs`, the corrected count is
///
/// ```text
/// target_window_secs * ((rate + off_noise)^2 * gain_b
///                       + (rate + off_noise) * gain_a
///                       + off_tot)
/// ```
///
/// A zero count is returned unchanged regardless of the coefficients.
pub fn pulse_correction(
    pulses: f64,
    source_window_secs: f64,
    target_window_secs: f64,
    gain_a: f64,
    gain_b: f64,
    off_tot: f64,
    off_noise: f64,
) -> f64 {
    if pulses == 0.0 {
        return pulses;
    }

    let rate = pulses / source_window_secs;
    target_window_secs * (((rate + off_noise).powi(2) * gain_b) + ((rate + off_noise) * gain_a) + off_tot)
}

/// Convert a corrected one-hour pulse count to watts.
pub fn pulses_to_watt(pulses: f64) -> f64 {
    pulses_to_kwh(pulses * 1000.0)
}

/// Convert a corrected one-hour pulse count to kWh.
pub fn pulses_to_kwh(pulses: f64) -> f64 {
    (pulses / 3600.0) / PULSES_PER_KWH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pulses_stay_zero() {
        // Zero must short-circuit before the offsets can skew it.
        assert_eq!(pulse_correction(0.0, 8.0, 3600.0, 1.0, 1.0, 5.0, 5.0), 0.0);
        assert_eq!(pulse_correction(0.0, 1.0, 1.0, -3.0, 0.5, 0.1, -0.2), 0.0);
    }

    #[test]
    fn identity_coefficients_rescale_linearly() {
        // gain_a = 1, everything else 0: the correction is a pure
        // window rescale. 8 pulses in 8 s -> 3600 pulses per hour.
        let corrected = pulse_correction(8.0, 8.0, 3600.0, 1.0, 0.0, 0.0, 0.0);
        assert!((corrected - 3600.0).abs() < 1e-9);
    }

    #[test]
    fn quadratic_term_applies() {
        // rate = 2, off_noise = 1 -> (3^2 * 0.5) + (3 * 2.0) + 0.25 = 10.75
        let corrected = pulse_correction(4.0, 2.0, 1.0, 2.0, 0.5, 0.25, 1.0);
        assert!((corrected - 10.75).abs() < 1e-9);
    }

    #[test]
    fn watt_is_kwh_of_thousandfold_pulses() {
        for pulses in [0.0, 1.0, 42.5, 3600.0, 1_684_578.0] {
            assert_eq!(pulses_to_watt(pulses), pulses_to_kwh(pulses * 1000.0));
        }
    }

    #[test]
    fn kwh_constant_sanity() {
        // 468.9385193 pulses/kWh * 3600 s/h = 1_688_178.67 pulse-seconds,
        // so ~1.68 million pulses over an hour is one kWh.
        let kwh = pulses_to_kwh(468.9385193 * 3600.0);
        assert!((kwh - 1.0).abs() < 1e-12);
        let kwh = pulses_to_kwh(1_684_578.0);
        assert!((kwh - 1.0).abs() < 3e-3);
    }
}
