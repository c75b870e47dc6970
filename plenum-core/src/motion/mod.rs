//! Actuator motion tracking
//!
//! Converts absolute position targets into incremental stepper commands
//! and reconstructs position from commanded step counts, since the
//! actuator never reports absolute position.

pub mod tracker;

pub use tracker::StepTracker;
