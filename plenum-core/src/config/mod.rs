//! Configuration types
//!
//! Board-agnostic controller configuration. Persistence is owned by the
//! parameter-storage subsystem; with the `serde` feature enabled the
//! types derive the traits it needs.

pub mod types;

pub use types::*;
