//! Controller mode sequencing
//!
//! The top-level state machine: initialization homing, normal
//! regulation, actuator test cycling and power-down handling. One tick
//! runs per control-loop iteration; every transition completes within
//! that tick.

pub mod machine;

pub use machine::{ChokeController, Mode};
