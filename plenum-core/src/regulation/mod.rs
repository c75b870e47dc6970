//! Idle position regulation
//!
//! The open-loop startup correction engine, the shared closed-loop RPM
//! regulator, and the combined IAC position calculation for injected
//! engines. One of the two strategy paths runs per control cycle; they
//! are never active together.

pub mod iac;
pub mod regulator;
pub mod startup;

pub use iac::{IacPhase, IacPosition};
pub use regulator::RpmRegulator;
pub use startup::{StartupCorrection, StartupPhase};
