//! Combined IAC position calculation for injected engines
//!
//! The internal position is a 0-800 value: the % x2 calibration curves
//! scaled x4. Cranking positions come from the crank curve, then either
//! a time-proportional crank-to-run transition into the run curve, or -
//! with the closed idle loop configured - straight into regulation gated
//! by the idle-band hysteresis. The position converts to a PWM duty or
//! a stepper step count at the output.

use crate::config::IacParams;
use crate::engine::{EngineMode, EngineSnapshot, Ticks};
use crate::traits::CalibrationTables;

use super::regulator::RpmRegulator;
use super::startup::REG_PERIOD_TICKS;

/// Full scale of the internal position value (100% x2 x4)
pub const IAC_POS_SPAN: i32 = 800;

/// Full scale of the PWM duty output
const DUTY_SPAN: i32 = 256;

/// IAC position phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IacPhase {
    /// Cranking: position from the crank curve
    #[default]
    Crank,
    /// Interpolating from the crank curve into the run curve
    CrankToRun,
    /// Running: run curve, or the closed idle loop
    Run,
}

/// IAC position state
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IacPosition {
    phase: IacPhase,
    /// Time cranking ended, for the crank-to-run interpolation
    crank_exit: Ticks,
    /// Last regulator cadence tick
    reg_tick: Ticks,
    /// Closed idle loop currently active
    closed_loop: bool,
    /// Position accumulator, 0-800
    pos_x4: i16,
}

impl IacPosition {
    /// Create the calculation in its cranking phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the cranking phase
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current phase
    pub fn phase(&self) -> IacPhase {
        self.phase
    }

    /// Check if the closed idle loop is active
    pub fn closed_loop_active(&self) -> bool {
        self.closed_loop
    }

    /// Compute this cycle's internal position (0-800)
    pub fn position<T: CalibrationTables>(
        &mut self,
        params: &IacParams,
        reg_turn_on_temp_x10: i16,
        tables: &T,
        regulator: &mut RpmRegulator,
        snap: &EngineSnapshot,
    ) -> i16 {
        match self.phase {
            IacPhase::Crank => {
                self.pos_x4 = i16::from(tables.iac_crank_pct2(snap.coolant_temp_x10)) << 2;
                if snap.mode.is_running() {
                    self.closed_loop = false;
                    self.crank_exit = snap.now;
                    self.reg_tick = snap.now;
                    // the closed loop takes over immediately; the soft
                    // crank-to-run transition only serves open loop
                    self.phase = if params.closed_loop {
                        IacPhase::Run
                    } else {
                        IacPhase::CrankToRun
                    };
                }
            }
            IacPhase::CrankToRun => {
                let since = snap.now.since(self.crank_exit);
                if since >= params.crank_to_run_ticks {
                    self.phase = IacPhase::Run;
                    self.reg_tick = snap.now;
                    // the run value applies this same cycle
                    self.run(params, reg_turn_on_temp_x10, tables, regulator, snap);
                } else {
                    let crank = i32::from(tables.iac_crank_pct2(snap.coolant_temp_x10));
                    let run = i32::from(tables.iac_run_pct2(snap.coolant_temp_x10));
                    let total = i32::from(params.crank_to_run_ticks);
                    let remaining = total - i32::from(since);
                    let pos = run - (((run - crank) * remaining * 128 / total) >> 7);
                    self.pos_x4 = (pos.clamp(0, 200) << 2) as i16;
                }
            }
            IacPhase::Run => self.run(params, reg_turn_on_temp_x10, tables, regulator, snap),
        }

        self.pos_x4
    }

    /// Run-phase position: open loop from the run curve, or the closed
    /// idle loop gated by the idle-band hysteresis
    fn run<T: CalibrationTables>(
        &mut self,
        params: &IacParams,
        reg_turn_on_temp_x10: i16,
        tables: &T,
        regulator: &mut RpmRegulator,
        snap: &EngineSnapshot,
    ) {
        if params.closed_loop {
            if snap.now.since(self.reg_tick) < REG_PERIOD_TICKS {
                return; // hold position between regulator calls
            }
            self.reg_tick = snap.now;

            let target = tables.target_idle_rpm(snap.coolant_temp_x10);
            let enter_rpm =
                (i32::from(target) * (i32::from(params.enter_coef_x128) + 128)) >> 7;
            let exit_rpm =
                (i32::from(target) * (i32::from(params.exit_coef_x128) + 128)) >> 7;
            let idling = snap.mode == EngineMode::Idle;

            if !self.closed_loop && idling && i32::from(snap.rpm_inst) < enter_rpm {
                self.closed_loop = true;
            } else if self.closed_loop && (!idling || i32::from(snap.rpm_inst) > exit_rpm) {
                // one-shot bump smooths the hand-back to open loop
                self.pos_x4 += i16::from(params.exit_bump_pct2) << 2;
                self.closed_loop = false;
            }

            if self.closed_loop {
                let rigidity = tables.regulator_rigidity_x128(params.gains.target_map, target);
                let delta = regulator.update(
                    &params.gains,
                    rigidity,
                    target,
                    snap.rpm,
                    snap.coolant_temp_x10,
                    reg_turn_on_temp_x10,
                );
                self.pos_x4 = (i32::from(self.pos_x4) + delta).clamp(0, IAC_POS_SPAN) as i16;
            }
        } else {
            self.pos_x4 = i16::from(tables.iac_run_pct2(snap.coolant_temp_x10)) << 2;
        }

        if !snap.mode.is_running() {
            self.phase = IacPhase::Crank;
            regulator.reset();
        }
    }

    /// Convert an internal position to a PWM duty (0-255)
    pub fn to_duty(pos_x4: i16) -> u8 {
        ((DUTY_SPAN * i32::from(pos_x4)) / IAC_POS_SPAN).clamp(0, 255) as u8
    }

    /// Convert an internal position to stepper steps
    pub fn to_steps(pos_x4: i16, total_steps: u16) -> i16 {
        ((i32::from(total_steps) * i32::from(pos_x4)) / IAC_POS_SPAN) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegulatorGains;

    const TURN_ON_X10: i16 = 500;

    struct TestTables {
        crank_pct2: u8,
        run_pct2: u8,
        target_rpm: u16,
    }

    impl Default for TestTables {
        fn default() -> Self {
            Self {
                crank_pct2: 40,
                run_pct2: 120,
                target_rpm: 1600,
            }
        }
    }

    impl CalibrationTables for TestTables {
        fn choke_closing_pct2(&self, _temp_x10: i16) -> u8 {
            0
        }
        fn target_idle_rpm(&self, _temp_x10: i16) -> u16 {
            self.target_rpm
        }
        fn idle_rpm_configured(&self) -> bool {
            true
        }
        fn iac_crank_pct2(&self, _temp_x10: i16) -> u8 {
            self.crank_pct2
        }
        fn iac_run_pct2(&self, _temp_x10: i16) -> u8 {
            self.run_pct2
        }
        fn regulator_rigidity_x128(&self, _map: i16, _rpm: u16) -> u16 {
            128
        }
    }

    fn open_loop_params() -> IacParams {
        IacParams {
            crank_to_run_ticks: 300,
            closed_loop: false,
            enter_coef_x128: 26,
            exit_coef_x128: 38,
            exit_bump_pct2: 4,
            gains: RegulatorGains::default(),
        }
    }

    fn closed_loop_params() -> IacParams {
        IacParams {
            closed_loop: true,
            ..open_loop_params()
        }
    }

    fn snapshot(now: u16, mode: EngineMode, rpm: u16) -> EngineSnapshot {
        let mut snap = EngineSnapshot::new(Ticks(now));
        snap.coolant_temp_x10 = 600; // warm: regulator in its full-law region
        snap.mode = mode;
        snap.rpm = rpm;
        snap.rpm_inst = rpm;
        snap
    }

    #[test]
    fn test_crank_position_from_crank_curve() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let snap = snapshot(0, EngineMode::Cranking, 250);
        let pos = iac.position(&open_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert_eq!(pos, 40 << 2);
        assert_eq!(iac.phase(), IacPhase::Crank);
    }

    #[test]
    fn test_crank_to_run_interpolation() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let p = open_loop_params();
        let t = TestTables::default();

        let snap = snapshot(0, EngineMode::Idle, 1200);
        iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);
        assert_eq!(iac.phase(), IacPhase::CrankToRun);

        // halfway through: halfway between crank (40) and run (120)
        let snap = snapshot(150, EngineMode::Idle, 1200);
        let pos = iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);
        assert_eq!(pos, 80 << 2);

        // expired: run value applies the same cycle
        let snap = snapshot(300, EngineMode::Idle, 1200);
        let pos = iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);
        assert_eq!(pos, 120 << 2);
        assert_eq!(iac.phase(), IacPhase::Run);
    }

    #[test]
    fn test_closed_loop_config_skips_transition() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let snap = snapshot(0, EngineMode::Idle, 1200);
        iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert_eq!(iac.phase(), IacPhase::Run);
    }

    #[test]
    fn test_open_loop_follows_run_curve() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let p = open_loop_params();
        let mut t = TestTables::default();

        let snap = snapshot(0, EngineMode::Idle, 1200);
        iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);
        let snap = snapshot(300, EngineMode::Idle, 1200);
        iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);

        t.run_pct2 = 100;
        let snap = snapshot(310, EngineMode::Idle, 1200);
        let pos = iac.position(&p, TURN_ON_X10, &t, &mut reg, &snap);
        assert_eq!(pos, 100 << 2);
    }

    /// Drive the calculation into the Run phase with the loop entered
    fn into_closed_loop(iac: &mut IacPosition, reg: &mut RpmRegulator) -> u16 {
        let p = closed_loop_params();
        let t = TestTables::default();
        let snap = snapshot(0, EngineMode::Idle, 1500);
        iac.position(&p, TURN_ON_X10, &t, reg, &snap);
        assert_eq!(iac.phase(), IacPhase::Run);

        // target 1600: entry threshold 1925, exit threshold 2075
        let snap = snapshot(REG_PERIOD_TICKS, EngineMode::Idle, 1500);
        iac.position(&p, TURN_ON_X10, &t, reg, &snap);
        assert!(iac.closed_loop_active());
        REG_PERIOD_TICKS
    }

    #[test]
    fn test_closed_loop_entry_and_regulation() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let now = into_closed_loop(&mut iac, &mut reg);

        // 100 RPM under target raises the position
        let before = iac.pos_x4;
        let snap = snapshot(now + REG_PERIOD_TICKS, EngineMode::Idle, 1500);
        let pos = iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert!(pos > before);
    }

    #[test]
    fn test_position_held_between_cadence_ticks() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let now = into_closed_loop(&mut iac, &mut reg);

        let before = iac.pos_x4;
        let snap = snapshot(now + 1, EngineMode::Idle, 1400);
        let pos = iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert_eq!(pos, before);
    }

    #[test]
    fn test_closed_loop_exit_applies_bump() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let now = into_closed_loop(&mut iac, &mut reg);

        let before = iac.pos_x4;
        // instantaneous RPM above the exit threshold (2075)
        let snap = snapshot(now + REG_PERIOD_TICKS, EngineMode::Idle, 2100);
        let pos = iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert!(!iac.closed_loop_active());
        assert_eq!(pos, before + 16); // exit_bump_pct2 = 4, x4
    }

    #[test]
    fn test_closed_loop_exit_on_leaving_idle() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let now = into_closed_loop(&mut iac, &mut reg);

        let snap = snapshot(now + REG_PERIOD_TICKS, EngineMode::Running, 1500);
        iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert!(!iac.closed_loop_active());
    }

    #[test]
    fn test_cranking_returns_to_crank_phase() {
        let mut iac = IacPosition::new();
        let mut reg = RpmRegulator::new();
        let now = into_closed_loop(&mut iac, &mut reg);

        let snap = snapshot(now + REG_PERIOD_TICKS, EngineMode::Cranking, 0);
        iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert_eq!(iac.phase(), IacPhase::Crank);

        // next cycle is a crank-curve cycle again
        let snap = snapshot(now + REG_PERIOD_TICKS + 1, EngineMode::Cranking, 0);
        let pos = iac.position(&closed_loop_params(), TURN_ON_X10, &TestTables::default(), &mut reg, &snap);
        assert_eq!(pos, 40 << 2);
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(IacPosition::to_duty(0), 0);
        assert_eq!(IacPosition::to_duty(400), 128);
        // full scale saturates the 8-bit duty
        assert_eq!(IacPosition::to_duty(800), 255);

        assert_eq!(IacPosition::to_steps(0, 300), 0);
        assert_eq!(IacPosition::to_steps(400, 300), 150);
        assert_eq!(IacPosition::to_steps(800, 300), 300);
    }
}
