//! Calibration lookup provider trait
//!
//! Calibration tables are owned by the parameter-storage subsystem;
//! the controller only consumes interpolated values through this
//! contract. Temperatures are coolant readings in 0.1 degC units,
//! positions come back in % x2 (0..=200).

/// Temperature/RPM-indexed calibration tables
pub trait CalibrationTables {
    /// Choke closing fraction vs coolant temperature, % x2
    ///
    /// Base position of the carburetor choke flap: 0 fully open,
    /// 200 fully closed.
    fn choke_closing_pct2(&self, temp_x10: i16) -> u8;

    /// Target idle RPM vs coolant temperature
    fn target_idle_rpm(&self, temp_x10: i16) -> u16;

    /// Check if a target-RPM curve is calibrated
    ///
    /// True when the first breakpoint of the curve is nonzero; an
    /// all-zero curve disarms RPM regulation entirely.
    fn idle_rpm_configured(&self) -> bool;

    /// IAC valve position for cranking vs coolant temperature, % x2
    fn iac_crank_pct2(&self, temp_x10: i16) -> u8;

    /// IAC valve position for a running engine vs coolant temperature, % x2
    fn iac_run_pct2(&self, temp_x10: i16) -> u8;

    /// Regulator rigidity by target manifold pressure and target RPM, x128
    ///
    /// Scales regulator aggressiveness by operating point; 128 is unity.
    fn regulator_rigidity_x128(&self, target_map: i16, target_rpm: u16) -> u16;
}
