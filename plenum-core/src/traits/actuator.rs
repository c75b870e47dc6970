//! Idle-air actuator driver traits
//!
//! Two actuator classes exist: a direction/step stepper moving a
//! mechanical choke flap, and a duty-cycle valve metering idle air
//! proportionally. Both are fire-and-forget: a command starts motion and
//! completion is observed by polling on later control cycles.

/// Flap travel direction
///
/// Position counts steps of closing: 0 is fully open, the configured
/// total travel is fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Toward 0 (flap fully open)
    Opening,
    /// Toward full travel (flap fully closed)
    Closing,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Opening => Direction::Closing,
            Direction::Closing => Direction::Opening,
        }
    }
}

/// Trait for direction/step actuator drivers
///
/// The driver reports only direction, busy state and a step counter -
/// never absolute position. Position is reconstructed by the caller from
/// commanded step counts and direction history.
pub trait StepperActuator {
    /// Set the travel direction for subsequent motion
    fn set_direction(&mut self, dir: Direction);

    /// Start a motion of `steps` steps in the current direction
    ///
    /// A value of 0 cancels the motion in progress; a nonzero count
    /// supersedes it. Position tracking only stays meaningful when a
    /// direction change happens at rest, which is the caller's job.
    fn run(&mut self, steps: u16);

    /// Check if a motion is in progress
    fn is_busy(&self) -> bool;

    /// Steps actually traveled since the last `run` command
    ///
    /// Valid once `is_busy` reports idle; a cancelled motion reports the
    /// distance covered before the stop took effect.
    fn steps_traveled(&self) -> u16;
}

/// Trait for duty-cycle (PWM) valve drivers
pub trait DutyActuator {
    /// Set the valve duty cycle, 0-255
    fn set_duty(&mut self, duty: u8);
}

/// Actuator class selected at configuration time
///
/// Replaces the original firmware's build-time actuator selection: one
/// binary can be configured for a stepper flap, a PWM valve, or no idle
/// actuator at all.
pub enum IacActuator<S, P> {
    /// Direction/step choke flap
    Stepper(S),
    /// Duty-cycle idle air valve
    Pwm(P),
    /// No idle-air actuator fitted
    Disabled,
}

impl<S, P> IacActuator<S, P> {
    /// Check if a stepper-class actuator is configured
    pub fn is_stepper(&self) -> bool {
        matches!(self, IacActuator::Stepper(_))
    }
}

/// Placeholder for an unused actuator-class slot
///
/// Lets a stepper-only build spell `IacActuator<MyStepper, NoActuator>`
/// (and the PWM build the converse) without a second driver type.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoActuator;

impl StepperActuator for NoActuator {
    fn set_direction(&mut self, _dir: Direction) {}
    fn run(&mut self, _steps: u16) {}
    fn is_busy(&self) -> bool {
        false
    }
    fn steps_traveled(&self) -> u16 {
        0
    }
}

impl DutyActuator for NoActuator {
    fn set_duty(&mut self, _duty: u8) {}
}
