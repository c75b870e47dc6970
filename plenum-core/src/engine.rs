//! Engine state snapshot consumed by the controller
//!
//! One snapshot is sampled per control cycle by the acquisition
//! subsystem and handed to [`tick`](crate::state::ChokeController::tick).
//! The controller writes its outputs back into the same structure.

/// Monotonic control-loop time in 10 ms ticks
///
/// The counter is sampled externally and wraps; comparisons must go
/// through [`Ticks::since`], never direct inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(pub u16);

impl Ticks {
    /// Ticks elapsed since `earlier`, wrap-safe
    pub fn since(self, earlier: Ticks) -> u16 {
        self.0.wrapping_sub(earlier.0)
    }
}

/// Coarse engine operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineMode {
    /// Starter engaged or engine stopped; no self-sustained rotation
    Cranking,
    /// Self-sustained rotation with the throttle closed
    Idle,
    /// Self-sustained rotation off idle
    Running,
}

impl EngineMode {
    /// Check if the engine rotates on its own
    pub fn is_running(self) -> bool {
        !matches!(self, EngineMode::Cranking)
    }
}

/// Filtered engine state for one control cycle
///
/// Input fields are read-only to the controller except `manual_delta`,
/// which is consumed (zeroed) once acted on. `position_pct2` and
/// `rpm_reg_active` are outputs written back every cycle.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineSnapshot {
    /// Sample time of this snapshot
    pub now: Ticks,
    /// Coolant temperature, 0.1 degC
    pub coolant_temp_x10: i16,
    /// Averaged crankshaft RPM
    pub rpm: u16,
    /// Instantaneous crankshaft RPM
    pub rpm_inst: u16,
    /// Gas valve open (running on gas fuel)
    pub gas_fuel: bool,
    /// Throttle idle limit switch closed
    pub throttle_closed: bool,
    /// Engine operating mode
    pub mode: EngineMode,
    /// Manual position adjustment in steps, consumed on read
    pub manual_delta: i16,
    /// Actuator test cycling requested
    pub test_request: bool,
    /// Main power relay energized
    pub power_relay_on: bool,

    /// Output: actuator position as % x2 of travel (0..=200)
    pub position_pct2: u8,
    /// Output: RPM regulation armed/active
    pub rpm_reg_active: bool,
}

impl EngineSnapshot {
    /// Snapshot of a cold stopped engine, relay energized
    pub fn new(now: Ticks) -> Self {
        Self {
            now,
            coolant_temp_x10: 200,
            rpm: 0,
            rpm_inst: 0,
            gas_fuel: false,
            throttle_closed: true,
            mode: EngineMode::Cranking,
            manual_delta: 0,
            test_request: false,
            power_relay_on: true,
            position_pct2: 0,
            rpm_reg_active: false,
        }
    }
}
