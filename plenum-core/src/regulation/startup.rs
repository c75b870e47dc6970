//! Startup correction engine
//!
//! Open-loop choke position bias for a carburetor engine warming up,
//! handing off to the closed-loop RPM regulator once the engine runs on
//! its own. Work flow: Start --> warm-up delay --> RPM regulation -->
//! done. Outside active regulation the correction is a pure function of
//! coolant temperature and fuel type.

use crate::config::ChokeParams;
use crate::engine::{EngineSnapshot, Ticks};
use crate::traits::CalibrationTables;

use super::regulator::RpmRegulator;

/// RPM regulator call period, 100 ms
pub const REG_PERIOD_TICKS: u16 = 10;

/// Exit from RPM regulation is locked out this long after entry
const EXIT_LOCK_TICKS: u16 = 1000; // 10 s

/// The regulator itself engages this long after entering regulation
const ENTRY_DELAY_TICKS: u16 = 300; // 3 s

/// RPM rise above the last baseline treated as a throttle opening
const EXIT_RPM_JUMP: i32 = 180;

/// RPM jump detection only runs above this speed
const EXIT_RPM_FLOOR: u16 = 1000;

/// Startup sequencing sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupPhase {
    /// Engine cranking or stopped; open-loop correction applies
    #[default]
    Starting,
    /// Engine started, waiting out the calibrated warm-up delay
    Warmup,
    /// Closed-loop RPM regulation of the choke position
    RpmRegulation,
    /// Regulation finished; no correction until the next start
    Done,
}

/// Startup correction state
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartupCorrection {
    phase: StartupPhase,
    /// Entry time of the current phase
    phase_entered: Ticks,
    /// Last regulator cadence tick
    reg_tick: Ticks,
    /// Exit conditions armed (the 10 s lock has expired)
    exit_armed: bool,
    /// Entry delay elapsed, regulator may run
    entry_elapsed: bool,
    /// RPM sample from the previous cadence tick, for jump detection
    rpm_baseline: u16,
    /// Accumulated regulator correction in steps
    correction: i16,
}

impl StartupCorrection {
    /// Create the engine in its cranking phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the cranking phase
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current sub-state
    pub fn phase(&self) -> StartupPhase {
        self.phase
    }

    /// Check if the RPM regulator may run with the current fuel
    fn reg_allowed(params: &ChokeParams, snap: &EngineSnapshot) -> bool {
        !(snap.gas_fuel && params.rpm_reg_off_on_gas)
    }

    /// Compute this cycle's position correction in steps
    ///
    /// Also maintains the snapshot's regulation-active flag: armed when
    /// the engine fires up with a calibrated target-RPM curve, cleared
    /// when regulation ends or the fuel type forbids it.
    pub fn correction<T: CalibrationTables>(
        &mut self,
        total_steps: u16,
        reg_turn_on_temp_x10: i16,
        params: &ChokeParams,
        tables: &T,
        regulator: &mut RpmRegulator,
        snap: &mut EngineSnapshot,
    ) -> i16 {
        match self.phase {
            StartupPhase::Starting => {
                if snap.mode.is_running() {
                    self.phase_entered = snap.now;
                    self.phase = StartupPhase::Warmup;
                    // armed now, engaged only after the warm-up delay
                    snap.rpm_reg_active =
                        tables.idle_rpm_configured() && Self::reg_allowed(params, snap);
                }
                // use the open-loop correction below
            }
            StartupPhase::Warmup => {
                if snap.now.since(self.phase_entered) >= params.warmup_delay_ticks {
                    self.phase = StartupPhase::RpmRegulation;
                    self.correction = 0;
                    self.rpm_baseline = snap.rpm;
                    self.phase_entered = snap.now;
                    self.reg_tick = snap.now;
                    self.exit_armed = false;
                    self.entry_elapsed = false;
                    regulator.reset();
                }
                // use the open-loop correction below
            }
            StartupPhase::RpmRegulation => {
                let mut rpm_corr = self.correction;
                if snap.now.since(self.reg_tick) >= REG_PERIOD_TICKS {
                    self.reg_tick = snap.now;
                    if snap.now.since(self.phase_entered) >= EXIT_LOCK_TICKS {
                        self.exit_armed = true;
                    }
                    if snap.now.since(self.phase_entered) >= ENTRY_DELAY_TICKS {
                        self.entry_elapsed = true;
                    }
                    if self.entry_elapsed {
                        let target = tables.target_idle_rpm(snap.coolant_temp_x10);
                        let rigidity =
                            tables.regulator_rigidity_x128(params.gains.target_map, target);
                        let delta = regulator.update(
                            &params.gains,
                            rigidity,
                            target,
                            snap.rpm,
                            snap.coolant_temp_x10,
                            reg_turn_on_temp_x10,
                        );
                        let limit = i32::from(total_steps);
                        self.correction =
                            (i32::from(self.correction) + delta).clamp(-limit, limit) as i16;
                        rpm_corr = self.correction;
                    }

                    let jumped = self.exit_armed
                        && snap.rpm > EXIT_RPM_FLOOR
                        && i32::from(snap.rpm) - i32::from(self.rpm_baseline) > EXIT_RPM_JUMP;
                    if snap.coolant_temp_x10 >= reg_turn_on_temp_x10 || jumped {
                        self.phase = StartupPhase::Done;
                        self.correction = 0;
                        rpm_corr = 0;
                        snap.rpm_reg_active = false;
                    } else {
                        self.rpm_baseline = snap.rpm;
                    }
                }

                if !Self::reg_allowed(params, snap) {
                    snap.rpm_reg_active = false;
                    rpm_corr = 0;
                }

                if !snap.mode.is_running() {
                    self.phase = StartupPhase::Starting;
                }
                return rpm_corr;
            }
            StartupPhase::Done => {
                if !snap.mode.is_running() {
                    self.phase = StartupPhase::Starting;
                }
                return 0;
            }
        }

        Self::open_loop(total_steps, params, snap)
    }

    /// Open-loop correction outside active regulation
    fn open_loop(total_steps: u16, params: &ChokeParams, snap: &EngineSnapshot) -> i16 {
        if snap.coolant_temp_x10 > params.startup_temp_limit_x10
            || (snap.gas_fuel && params.startup_corr_off_on_gas)
        {
            0
        } else if snap.coolant_temp_x10 < 0 {
            // below freezing the choke must be fully closed
            total_steps as i16
        } else {
            ((i32::from(total_steps) * i32::from(params.startup_pct2)) / 200) as i16
        }
    }
}
