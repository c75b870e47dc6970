//! Idle-air controller state machine
//!
//! Sequences homing, normal regulation, test cycling and power-down
//! around the position calculation. The stepper has no position
//! feedback, so every (re)initialization seeks toward the open stop
//! with more steps than the actuator travel and re-references the
//! tracker at zero once the motion settles.

use crate::config::{IdleConfig, IdleStrategy};
use crate::engine::EngineSnapshot;
use crate::motion::StepTracker;
use crate::regulation::{IacPosition, RpmRegulator, StartupCorrection};
use crate::traits::{CalibrationTables, Direction, DutyActuator, IacActuator, StepperActuator};

/// Full scale of the PWM duty output
const DUTY_SPAN: u16 = 256;

/// Controller mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Power-on state; issues the first homing seek
    Init,
    /// Re-homing before power-down or after test cycling
    PreparePowerdown,
    /// Waiting for a homing seek to settle
    Homing,
    /// Main power relay dropped; holding until it returns
    PoweredDown,
    /// Normal working mode
    Normal,
    /// Test cycling: at the open stop, about to close
    TestClose,
    /// Test cycling: at the closed stop, about to open
    TestOpen,
}

/// Idle-air / choke position controller
///
/// The single context object owned by the caller. `tick` runs one
/// control cycle: mode evaluation, position calculation, at most one
/// directional command, position reporting.
pub struct ChokeController<S, P, T> {
    config: IdleConfig,
    tables: T,
    actuator: IacActuator<S, P>,
    mode: Mode,
    tracker: StepTracker,
    startup: StartupCorrection,
    iac: IacPosition,
    regulator: RpmRegulator,
    powerdown_pending: bool,
    manual_override: bool,
    /// Coolant sample the last position was computed from
    last_temp_x10: i16,
}

impl<S, P, T> ChokeController<S, P, T>
where
    S: StepperActuator,
    P: DutyActuator,
    T: CalibrationTables,
{
    /// Create a controller in its initialization state
    pub fn new(config: IdleConfig, tables: T, actuator: IacActuator<S, P>) -> Self {
        Self {
            config,
            tables,
            actuator,
            mode: Mode::Init,
            tracker: StepTracker::new(),
            startup: StartupCorrection::new(),
            iac: IacPosition::new(),
            regulator: RpmRegulator::new(),
            powerdown_pending: false,
            manual_override: false,
            last_temp_x10: 0,
        }
    }

    /// Reset to the initialization state
    pub fn init(&mut self) {
        self.mode = Mode::Init;
        self.startup.reset();
        self.iac.reset();
        self.regulator.reset();
        self.powerdown_pending = false;
        self.manual_override = false;
    }

    /// Current controller mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Tracked stepper position in steps
    pub fn position_steps(&self) -> i16 {
        self.tracker.position()
    }

    /// Borrow the actuator back out of the controller
    pub fn actuator(&self) -> &IacActuator<S, P> {
        &self.actuator
    }

    /// Mutably borrow the actuator, e.g. to advance a simulated motor
    /// between control cycles
    pub fn actuator_mut(&mut self) -> &mut IacActuator<S, P> {
        &mut self.actuator
    }

    /// Check if the controller has finished sequencing
    ///
    /// True in the normal and powered-down modes, and always when no
    /// working stepper is configured.
    pub fn is_ready(&self) -> bool {
        !self.stepper_fitted() || matches!(self.mode, Mode::Normal | Mode::PoweredDown)
    }

    /// Run one control cycle
    ///
    /// Consumes `manual_delta`, writes back `position_pct2` and
    /// `rpm_reg_active`.
    pub fn tick(&mut self, snap: &mut EngineSnapshot) {
        if matches!(self.actuator, IacActuator::Pwm(_)) {
            self.tick_pwm(snap);
            return;
        }
        if !self.stepper_fitted() {
            return;
        }
        self.tick_stepper(snap);
    }

    /// A stepper-class actuator with nonzero travel is configured
    fn stepper_fitted(&self) -> bool {
        self.actuator.is_stepper() && self.config.total_steps != 0
    }

    fn stepper_busy(&self) -> bool {
        match &self.actuator {
            IacActuator::Stepper(sm) => sm.is_busy(),
            _ => false,
        }
    }

    /// Duty-cycle valve cycle: no sequencing, position straight out
    fn tick_pwm(&mut self, snap: &mut EngineSnapshot) {
        let duty = match &self.config.strategy {
            IdleStrategy::Iac(params) => {
                self.last_temp_x10 = snap.coolant_temp_x10;
                let pos = self.iac.position(
                    params,
                    self.config.reg_turn_on_temp_x10,
                    &self.tables,
                    &mut self.regulator,
                    snap,
                );
                snap.rpm_reg_active = self.iac.closed_loop_active();
                IacPosition::to_duty(pos)
            }
            // a duty valve has no carburetor position source
            IdleStrategy::Choke(_) => 0,
        };
        snap.position_pct2 = percent_pos(u16::from(duty), DUTY_SPAN);
        if let IacActuator::Pwm(valve) = &mut self.actuator {
            valve.set_duty(duty);
        }
    }

    fn tick_stepper(&mut self, snap: &mut EngineSnapshot) {
        match self.mode {
            Mode::Init => {
                if snap.power_relay_on {
                    self.home_seek(snap);
                } else {
                    // relay already off: skip the seek and sit powered
                    // down until it returns
                    self.powerdown_pending = true;
                }
                self.last_temp_x10 = snap.coolant_temp_x10;
                self.mode = Mode::Homing;
            }

            Mode::PreparePowerdown => {
                self.home_seek(snap);
                self.mode = Mode::Homing;
            }

            Mode::Homing => {
                if !self.stepper_busy() {
                    self.tracker.rehome();
                    self.mode = if self.powerdown_pending {
                        Mode::PoweredDown
                    } else {
                        Mode::Normal
                    };
                }
            }

            Mode::PoweredDown => {
                if snap.power_relay_on {
                    self.powerdown_pending = false;
                    self.mode = Mode::Normal;
                }
            }

            Mode::Normal => {
                if snap.test_request {
                    self.home_seek(snap);
                    self.mode = Mode::TestClose;
                } else {
                    let target = if !self.manual_override {
                        let target = self.target_position(snap);
                        if snap.manual_delta != 0 {
                            self.manual_override = true;
                        }
                        target
                    } else {
                        let target = self.tracker.position() + snap.manual_delta;
                        snap.manual_delta = 0;
                        target
                    };
                    let total = self.config.total_steps;
                    if let IacActuator::Stepper(sm) = &mut self.actuator {
                        self.tracker.track(target, total, sm);
                    }
                }
                snap.position_pct2 =
                    percent_pos(self.tracker.position().max(0) as u16, self.config.total_steps);
                self.check_power(snap);
            }

            Mode::TestClose => {
                if !self.stepper_busy() {
                    snap.position_pct2 = 0;
                    let total = self.config.total_steps;
                    if let IacActuator::Stepper(sm) = &mut self.actuator {
                        sm.set_direction(Direction::Closing);
                        sm.run(total);
                    }
                    self.mode = Mode::TestOpen;
                }
                self.check_test(snap);
                self.check_power(snap);
            }

            Mode::TestOpen => {
                if !self.stepper_busy() {
                    snap.position_pct2 = 200;
                    let total = self.config.total_steps;
                    if let IacActuator::Stepper(sm) = &mut self.actuator {
                        sm.set_direction(Direction::Opening);
                        sm.run(total);
                    }
                    self.mode = Mode::TestClose;
                }
                self.check_test(snap);
                self.check_power(snap);
            }
        }
    }

    /// Target stepper position for normal working mode, in steps
    fn target_position(&mut self, snap: &mut EngineSnapshot) -> i16 {
        match &self.config.strategy {
            IdleStrategy::Iac(params) => {
                self.last_temp_x10 = snap.coolant_temp_x10;
                let pos = self.iac.position(
                    params,
                    self.config.reg_turn_on_temp_x10,
                    &self.tables,
                    &mut self.regulator,
                    snap,
                );
                snap.rpm_reg_active = self.iac.closed_loop_active();
                IacPosition::to_steps(pos, self.config.total_steps)
            }
            IdleStrategy::Choke(params) => {
                if params.temp_sensor_fitted {
                    self.last_temp_x10 = snap.coolant_temp_x10;
                    let closing =
                        i32::from(self.tables.choke_closing_pct2(snap.coolant_temp_x10));
                    let base = (i32::from(self.config.total_steps) * closing) / 200;
                    let corr = self.startup.correction(
                        self.config.total_steps,
                        self.config.reg_turn_on_temp_x10,
                        params,
                        &self.tables,
                        &mut self.regulator,
                        snap,
                    );
                    base as i16 + corr
                } else {
                    // no coolant sensor: leave the flap fully open
                    0
                }
            }
        }
    }

    /// Seek toward the open stop
    ///
    /// Without position feedback the seek overshoots the nominal travel
    /// by 3% to guarantee the stop is reached; with the throttle idle
    /// switch closed a quarter of the travel is enough.
    fn home_seek(&mut self, snap: &EngineSnapshot) {
        let total = self.config.total_steps;
        let steps = if snap.throttle_closed && self.config.short_home_on_closed_throttle {
            total >> 2
        } else {
            total + (total >> 5)
        };
        if let IacActuator::Stepper(sm) = &mut self.actuator {
            sm.set_direction(Direction::Opening);
            sm.run(steps);
        }
    }

    /// Withdrawn test request leaves test cycling through a re-home
    fn check_test(&mut self, snap: &EngineSnapshot) {
        if !snap.test_request {
            self.mode = Mode::PreparePowerdown;
        }
    }

    /// A dropped relay parks the flap before the power goes away
    fn check_power(&mut self, snap: &EngineSnapshot) {
        if !snap.power_relay_on {
            self.powerdown_pending = true;
            self.mode = Mode::PreparePowerdown;
        }
    }
}

/// Actuator position as % x2 of its span
///
/// A zero span means no actuator travel is configured; report fully
/// open rather than divide.
fn percent_pos(value: u16, span: u16) -> u8 {
    if span == 0 {
        return 0;
    }
    ((u32::from(value) * 200) / u32::from(span)).min(200) as u8
}
