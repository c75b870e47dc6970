//! Hardware abstraction traits
//!
//! These traits define the interface between the control logic and the
//! hardware-specific collaborators: the stepper/PWM actuator driver and
//! the calibration lookup provider.

pub mod actuator;
pub mod lookup;

pub use actuator::{Direction, DutyActuator, IacActuator, NoActuator, StepperActuator};
pub use lookup::CalibrationTables;
