//! Controller configuration structures
//!
//! All values are integer fixed point: temperatures in 0.1 degC,
//! percentages in % x2 (0..=200), regulator gains x256, time in 10 ms
//! control-loop ticks. The original packed flag byte is decomposed into
//! named booleans.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Idle-air controller configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdleConfig {
    /// Total stepper travel in steps
    ///
    /// Zero means no stepper is actually fitted and disables the
    /// stepper path outright.
    pub total_steps: u16,
    /// Use a quarter-travel homing seek when the throttle idle switch
    /// reports closed, instead of the full overshooting seek
    pub short_home_on_closed_throttle: bool,
    /// Regulator activation temperature (0.1 degC)
    ///
    /// Below this the engine counts as cold: the regulator applies its
    /// asymmetric cold law and the startup correction stays engaged.
    pub reg_turn_on_temp_x10: i16,
    /// Position-calculation strategy for the fuel system in use
    pub strategy: IdleStrategy,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            total_steps: 300,
            short_home_on_closed_throttle: false,
            reg_turn_on_temp_x10: 500, // 50.0 degC
            strategy: IdleStrategy::Choke(ChokeParams::default()),
        }
    }
}

/// Position-calculation strategy
///
/// Carburetor engines position a choke flap from the closing curve plus
/// a startup/RPM correction; injected engines position the IAC valve
/// from crank/run curves with an optional closed idle loop.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IdleStrategy {
    /// Carburetor choke flap
    Choke(ChokeParams),
    /// Fuel-injection idle air control valve
    Iac(IacParams),
}

/// Carburetor choke strategy parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChokeParams {
    /// Coolant temperature sensor fitted
    ///
    /// Without a sensor the choke stays fully open.
    pub temp_sensor_fitted: bool,
    /// Startup correction as a fraction of total travel, % x2
    pub startup_pct2: u8,
    /// Coolant temperature above which no startup correction applies (0.1 degC)
    pub startup_temp_limit_x10: i16,
    /// Warm-up delay between end of cranking and RPM regulation, ticks
    pub warmup_delay_ticks: u16,
    /// Disable the RPM regulator while running on gas fuel
    pub rpm_reg_off_on_gas: bool,
    /// Disable the startup correction while running on gas fuel
    pub startup_corr_off_on_gas: bool,
    /// Regulator gains shared with the closed idle loop
    pub gains: RegulatorGains,
}

impl Default for ChokeParams {
    fn default() -> Self {
        Self {
            temp_sensor_fitted: true,
            startup_pct2: 70,            // 35% of travel
            startup_temp_limit_x10: 450, // 45.0 degC
            warmup_delay_ticks: 300,     // 3 s
            rpm_reg_off_on_gas: true,
            startup_corr_off_on_gas: false,
            gains: RegulatorGains::default(),
        }
    }
}

/// Fuel-injection IAC strategy parameters
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IacParams {
    /// Crank-to-run position interpolation duration, ticks
    pub crank_to_run_ticks: u16,
    /// Run the closed idle loop (open loop from the run curve otherwise)
    pub closed_loop: bool,
    /// Closed-loop entry threshold coefficient, x128 above unity
    ///
    /// Entry RPM threshold is target x (coef + 128) / 128.
    pub enter_coef_x128: u8,
    /// Closed-loop exit threshold coefficient, x128 above unity
    pub exit_coef_x128: u8,
    /// One-shot position bump applied on closed-loop exit, % x2
    pub exit_bump_pct2: u8,
    /// Regulator gains shared with the carburetor strategy
    pub gains: RegulatorGains,
}

impl Default for IacParams {
    fn default() -> Self {
        Self {
            crank_to_run_ticks: 300, // 3 s
            closed_loop: true,
            enter_coef_x128: 26, // ~1.20 x target
            exit_coef_x128: 38,  // ~1.30 x target
            exit_bump_pct2: 4,   // 2%
            gains: RegulatorGains::default(),
        }
    }
}

/// Closed-loop RPM regulator gains
///
/// Gains are x256; the rigidity lookup contributes a further x128, so a
/// regulator product is rescaled by >> 15.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegulatorGains {
    /// Proportional gain (applied to the error derivative), x256
    pub kp_x256: u16,
    /// Integral gain (applied to the clamped error), x256
    pub ki_x256: u16,
    /// Symmetric clamp on the RPM error fed to the regulator
    pub error_limit_rpm: i16,
    /// Target manifold pressure for the rigidity lookup, sensor units
    pub target_map: i16,
}

impl Default for RegulatorGains {
    fn default() -> Self {
        Self {
            kp_x256: 35,
            ki_x256: 17,
            error_limit_rpm: 200,
            target_map: 4160,
        }
    }
}
