//! Closed-loop RPM regulator
//!
//! One PI law serves both actuator classes: the carburetor choke
//! correction accumulates its output in stepper steps, the injection
//! idle loop in the 0-800 valve position scale. The caller owns the
//! accumulator and its clamp; this module owns the error memory.

use crate::config::RegulatorGains;

/// PI regulator over the idle RPM error
///
/// Gains are x256 and the rigidity multiplier x128, so every update is
/// computed in 32 bits and rescaled by >> 15. The proportional gain
/// acts on the error derivative and the integral gain on the error
/// itself, which makes the accumulated position the integral term.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RpmRegulator {
    /// Previous clamped error, for the derivative
    prev_error: i16,
}

impl RpmRegulator {
    /// Create a regulator with zeroed memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the error memory
    ///
    /// Called on every re-entry to cranking so a fresh start never
    /// inherits a stale derivative baseline.
    pub fn reset(&mut self) {
        self.prev_error = 0;
    }

    /// Run one regulator update and return the position delta
    ///
    /// A cold engine (coolant below `turn_on_temp_x10` with RPM still
    /// under target) gets only the derivative term, and only while both
    /// error and derivative are positive. That holds the position during
    /// a cold undershoot instead of winding it up, and still reacts when
    /// RPM keeps falling away from the target. A hot engine, or one at
    /// or above target RPM, gets the full PI update.
    pub fn update(
        &mut self,
        gains: &RegulatorGains,
        rigidity_x128: u16,
        target_rpm: u16,
        measured_rpm: u16,
        coolant_temp_x10: i16,
        turn_on_temp_x10: i16,
    ) -> i32 {
        let limit = i32::from(gains.error_limit_rpm);
        let error = (i32::from(target_rpm) - i32::from(measured_rpm)).clamp(-limit, limit);
        let derror = error - i32::from(self.prev_error);

        let rigidity = i32::from(rigidity_x128);
        let kp = i32::from(gains.kp_x256);
        let ki = i32::from(gains.ki_x256);

        let cold = coolant_temp_x10 < turn_on_temp_x10 && measured_rpm < target_rpm;
        let delta = if !cold {
            (rigidity * (derror * kp + error * ki)) >> 15
        } else if error > 0 && derror > 0 {
            (rigidity * (derror * kp)) >> 15
        } else {
            0
        };

        self.prev_error = error as i16;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOT: i16 = 900;
    const COLD: i16 = 300;
    const TURN_ON: i16 = 500;

    fn gains() -> RegulatorGains {
        RegulatorGains {
            kp_x256: 35,
            ki_x256: 17,
            error_limit_rpm: 200,
            target_map: 4160,
        }
    }

    #[test]
    fn test_sign_follows_error() {
        // Integral-only gains: output sign must track the error sign as
        // measured RPM rises through the target.
        let g = RegulatorGains {
            kp_x256: 0,
            ki_x256: 17,
            error_limit_rpm: 200,
            target_map: 4160,
        };
        let mut reg = RpmRegulator::new();

        for measured in [900u16, 950, 1000, 1050, 1100] {
            let delta = reg.update(&g, 128, 1000, measured, HOT, TURN_ON);
            if measured < 1000 {
                assert!(delta > 0, "undershoot must raise position");
            } else {
                assert!(delta <= 0, "at/above target must not raise position");
            }
        }
    }

    #[test]
    fn test_error_clamped() {
        let mut reg = RpmRegulator::new();
        // 3000 RPM of error clamps to 200: same delta as a 200 RPM error
        let big = reg.update(&gains(), 128, 4000, 1000, HOT, TURN_ON);
        let mut reg = RpmRegulator::new();
        let small = reg.update(&gains(), 128, 1200, 1000, HOT, TURN_ON);
        assert_eq!(big, small);
    }

    #[test]
    fn test_cold_uses_derivative_only() {
        let mut cold_reg = RpmRegulator::new();
        let cold = cold_reg.update(&gains(), 128, 1600, 1400, COLD, TURN_ON);

        let mut hot_reg = RpmRegulator::new();
        let hot = hot_reg.update(&gains(), 128, 1600, 1400, HOT, TURN_ON);

        // error = derror = 200: cold drops the integral contribution
        assert_eq!(cold, (128 * (200 * 35)) >> 15);
        assert_eq!(hot, (128 * (200 * 35 + 200 * 17)) >> 15);
        assert!(cold < hot);
    }

    #[test]
    fn test_cold_holds_on_recovery() {
        let mut reg = RpmRegulator::new();
        reg.update(&gains(), 128, 1600, 1400, COLD, TURN_ON);
        // RPM recovering: derivative negative, cold law holds position
        let delta = reg.update(&gains(), 128, 1600, 1500, COLD, TURN_ON);
        assert_eq!(delta, 0);
    }

    #[test]
    fn test_cold_at_target_uses_full_law() {
        let mut reg = RpmRegulator::new();
        // RPM at target: full law applies even below the temperature
        // threshold, so overshoot is pulled back down
        let delta = reg.update(&gains(), 128, 1600, 1700, COLD, TURN_ON);
        assert!(delta < 0);
    }

    #[test]
    fn test_reset_clears_derivative_baseline() {
        let mut reg = RpmRegulator::new();
        reg.update(&gains(), 128, 1600, 1400, HOT, TURN_ON);
        reg.reset();
        let after_reset = reg.update(&gains(), 128, 1600, 1400, HOT, TURN_ON);

        let mut fresh = RpmRegulator::new();
        let first = fresh.update(&gains(), 128, 1600, 1400, HOT, TURN_ON);
        assert_eq!(after_reset, first);
    }

    #[test]
    fn test_rigidity_scales_output() {
        // kp + ki chosen so the products divide the >> 15 rescale
        // exactly and the x4 rigidity relation holds without flooring
        let g = RegulatorGains {
            kp_x256: 35,
            ki_x256: 29,
            error_limit_rpm: 200,
            target_map: 4160,
        };
        let mut reg = RpmRegulator::new();
        let soft = reg.update(&g, 64, 1200, 1000, HOT, TURN_ON);
        let mut reg = RpmRegulator::new();
        let stiff = reg.update(&g, 256, 1200, 1000, HOT, TURN_ON);
        assert_eq!(soft, 25);
        assert_eq!(stiff, soft * 4);
    }
}
