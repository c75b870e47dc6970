//! Simulation models for exercising the idle-air controller on a host
//!
//! Provides a rate-limited stepper model with mechanical stops and a
//! bounded command log, a duty-valve model, and breakpoint calibration
//! tables - enough to drive whole startup, test-cycling and power-down
//! scenarios through the controller's public API.

#![no_std]
#![deny(unsafe_code)]

use heapless::Vec;

use plenum_core::config::{ChokeParams, IacParams, IdleConfig, IdleStrategy};
use plenum_core::traits::{CalibrationTables, Direction, DutyActuator, StepperActuator};

/// Maximum commands kept in a stepper log
pub const LOG_CAPACITY: usize = 128;

/// A command observed by the simulated stepper driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmCommand {
    /// Direction change
    Dir(Direction),
    /// Motion start (steps > 0) or cancel (0)
    Run(u16),
}

/// Rate-limited stepper model with mechanical stops
///
/// The electrical step counter advances for every commanded step, but
/// the flap position clamps at the mechanical stops - which is exactly
/// why the controller's homing seek overshoots the nominal travel.
#[derive(Debug)]
pub struct SimStepper {
    /// True flap position in steps (hidden from the controller)
    position: i16,
    /// Mechanical travel between the stops
    travel: u16,
    /// Steps executed per control cycle
    rate: u16,
    dir: Direction,
    remaining: u16,
    traveled: u16,
    /// Every command issued by the controller, in order
    pub log: Vec<SmCommand, LOG_CAPACITY>,
}

impl SimStepper {
    /// Create a stepper resting at an arbitrary (unhomed) position
    pub fn new(travel: u16, rate: u16, start_position: i16) -> Self {
        Self {
            position: start_position,
            travel,
            rate,
            dir: Direction::Opening,
            remaining: 0,
            traveled: 0,
            log: Vec::new(),
        }
    }

    /// True flap position, for assertions
    pub fn position(&self) -> i16 {
        self.position
    }

    /// Advance the motor by one control cycle
    pub fn advance(&mut self) {
        let n = self.remaining.min(self.rate);
        self.remaining -= n;
        self.traveled += n;
        let moved = match self.dir {
            Direction::Opening => self.position - n as i16,
            Direction::Closing => self.position + n as i16,
        };
        // steps past a mechanical stop are lost, not traveled
        self.position = moved.clamp(0, self.travel as i16);
    }

    /// Run the motor until the current motion completes
    pub fn run_out(&mut self) {
        while self.remaining > 0 {
            self.advance();
        }
    }

    fn push(&mut self, cmd: SmCommand) {
        let _ = self.log.push(cmd);
    }
}

impl StepperActuator for SimStepper {
    fn set_direction(&mut self, dir: Direction) {
        self.dir = dir;
        self.push(SmCommand::Dir(dir));
    }

    fn run(&mut self, steps: u16) {
        if steps > 0 {
            self.traveled = 0;
        }
        self.remaining = steps;
        self.push(SmCommand::Run(steps));
    }

    fn is_busy(&self) -> bool {
        self.remaining > 0
    }

    fn steps_traveled(&self) -> u16 {
        self.traveled
    }
}

/// Duty-valve model recording the commanded duty
#[derive(Debug, Default)]
pub struct SimValve {
    pub duty: u8,
}

impl DutyActuator for SimValve {
    fn set_duty(&mut self, duty: u8) {
        self.duty = duty;
    }
}

/// Breakpoint curve with linear interpolation
///
/// Values outside the first/last breakpoint clamp to the end points.
#[derive(Debug, Clone)]
pub struct Curve<const N: usize> {
    points: Vec<(i16, i16), N>,
}

impl<const N: usize> Curve<N> {
    /// Build a curve from breakpoints sorted by x
    pub fn new(points: &[(i16, i16)]) -> Self {
        let mut v = Vec::new();
        for &p in points {
            let _ = v.push(p);
        }
        Self { points: v }
    }

    /// A curve that returns the same value everywhere
    pub fn flat(y: i16) -> Self {
        Self::new(&[(0, y)])
    }

    /// Sample the curve at `x`
    pub fn sample(&self, x: i16) -> i16 {
        let first = match self.points.first() {
            Some(&p) => p,
            None => return 0,
        };
        if x <= first.0 {
            return first.1;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if x <= x1 {
                let span = i32::from(x1 - x0);
                if span == 0 {
                    return y1;
                }
                let t = i32::from(x - x0);
                return (i32::from(y0) + (i32::from(y1 - y0) * t) / span) as i16;
            }
        }
        self.points.last().map(|&(_, y)| y).unwrap_or(0)
    }
}

/// Calibration tables backed by breakpoint curves
#[derive(Debug, Clone)]
pub struct SimTables {
    /// Choke closing curve: coolant temp (x10) -> % x2
    pub closing: Curve<8>,
    /// Target idle RPM curve: coolant temp (x10) -> RPM
    pub idle_rpm: Curve<8>,
    /// IAC crank curve: coolant temp (x10) -> % x2
    pub crank: Curve<8>,
    /// IAC run curve: coolant temp (x10) -> % x2
    pub run: Curve<8>,
    /// Flat rigidity for all operating points
    pub rigidity_x128: u16,
}

impl Default for SimTables {
    fn default() -> Self {
        Self {
            closing: Curve::new(&[(-300, 200), (200, 120), (700, 0)]),
            idle_rpm: Curve::new(&[(-300, 1800), (200, 1600), (800, 1100)]),
            crank: Curve::new(&[(-300, 100), (200, 60), (800, 30)]),
            run: Curve::new(&[(-300, 160), (200, 120), (800, 60)]),
            rigidity_x128: 128,
        }
    }
}

impl CalibrationTables for SimTables {
    fn choke_closing_pct2(&self, temp_x10: i16) -> u8 {
        self.closing.sample(temp_x10).clamp(0, 200) as u8
    }

    fn target_idle_rpm(&self, temp_x10: i16) -> u16 {
        self.idle_rpm.sample(temp_x10).max(0) as u16
    }

    fn idle_rpm_configured(&self) -> bool {
        self.idle_rpm.points.first().is_some_and(|&(_, y)| y != 0)
    }

    fn iac_crank_pct2(&self, temp_x10: i16) -> u8 {
        self.crank.sample(temp_x10).clamp(0, 200) as u8
    }

    fn iac_run_pct2(&self, temp_x10: i16) -> u8 {
        self.run.sample(temp_x10).clamp(0, 200) as u8
    }

    fn regulator_rigidity_x128(&self, _target_map: i16, _target_rpm: u16) -> u16 {
        self.rigidity_x128
    }
}

/// Stepper controller configuration used by the scenario tests
pub fn choke_config(total_steps: u16) -> IdleConfig {
    IdleConfig {
        total_steps,
        strategy: IdleStrategy::Choke(ChokeParams::default()),
        ..IdleConfig::default()
    }
}

/// IAC valve configuration used by the scenario tests
pub fn iac_config(total_steps: u16, closed_loop: bool) -> IdleConfig {
    IdleConfig {
        total_steps,
        strategy: IdleStrategy::Iac(IacParams {
            closed_loop,
            ..IacParams::default()
        }),
        ..IdleConfig::default()
    }
}
