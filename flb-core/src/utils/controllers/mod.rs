//! Module Exports
//!
//! This file exports the actuator drivers and defines the controller that
//! ties them to operator intent.
//!
//! - `calibration`: duty/angle bounds and loop timing.
//! - `intent`: operator intent and the latest-value slot.
//! - `motor`: H-bridge DC motor driver.
//! - `servo`: lift position servo driver.
//! - `pca9685`: I2C PWM expander providing PWM and direction lines.

pub mod calibration;
pub mod intent;
pub mod motor;
pub mod pca9685;
pub mod servo;

use embassy_time::{Duration, Instant, Ticker};
use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

pub use calibration::{
    CalibrationError, ControlConfig, MotorCalibration, RobotConfig, ServoCalibration,
};
pub use intent::{publish, IntentSignal, IntentVector, Sample, INTENT_SIGNAL};
pub use motor::{MotorDriver, MotorError};
pub use servo::{ServoDriver, ServoError};

use crate::utils::math::kinematics::DifferentialKinematics;

/// Owns the two drive motors, the lift and an optional status LED, and
/// applies the latest operator intent to them once per tick.
pub struct SystemController<PWM, PIN, LIFT> {
    left: MotorDriver<PWM, PIN>,
    right: MotorDriver<PWM, PIN>,
    lift: ServoDriver<LIFT>,
    status: Option<PIN>,
    kinematics: DifferentialKinematics,
    control: ControlConfig,
    intent: IntentVector,
    received_at: Option<Instant>,
    stale: bool,
    faulted: bool,
}

impl<PWM, PIN, LIFT> SystemController<PWM, PIN, LIFT>
where
    PWM: SetDutyCycle,
    PIN: OutputPin,
    LIFT: SetDutyCycle,
{
    /// Build the controller. The status LED, when present, is switched on
    /// once the configuration has been accepted.
    pub fn new(
        left: MotorDriver<PWM, PIN>,
        right: MotorDriver<PWM, PIN>,
        lift: ServoDriver<LIFT>,
        status: Option<PIN>,
        control: ControlConfig,
    ) -> Result<Self, CalibrationError> {
        control.validate()?;

        let mut ctrl = SystemController {
            left,
            right,
            lift,
            status,
            kinematics: DifferentialKinematics::new(control.lift_rate),
            control,
            intent: IntentVector::NEUTRAL,
            received_at: None,
            stale: false,
            faulted: false,
        };

        if let Some(led) = ctrl.status.as_mut() {
            if let Err(error) = led.set_high() {
                tracing::error!(?error, "status LED write failed");
            }
        }
        tracing::info!(
            period_ms = control.period_ms,
            stale_after_ms = ?control.stale_after_ms,
            lift_rate = control.lift_rate,
            status_led = ctrl.status.is_some(),
            "controller ready"
        );

        Ok(ctrl)
    }

    /// Current operator intent.
    pub fn intent(&self) -> IntentVector {
        self.intent
    }

    pub fn lift_angle(&self) -> f32 {
        self.lift.angle()
    }

    /// Replace the stored intent with `sample`.
    pub fn ingest(
        &mut self,
        sample: Sample,
    ) {
        self.intent = sample.intent;
        self.received_at = Some(sample.received_at);
    }

    /// Ingest the pending sample from `slot`, if any. Never waits.
    pub fn poll(
        &mut self,
        slot: &IntentSignal,
    ) -> bool {
        match slot.try_take() {
            Some(sample) => {
                self.ingest(sample);
                true
            }
            None => false,
        }
    }

    /// Whether the stored sample is too old to keep driving at `now`.
    pub fn is_stale(
        &self,
        now: Instant,
    ) -> bool {
        match (self.control.stale_after_ms, self.received_at) {
            (Some(limit), Some(at)) => now
                .checked_duration_since(at)
                .is_some_and(|age| age > Duration::from_millis(limit)),
            _ => false,
        }
    }

    /// Apply the stored intent to the hardware.
    ///
    /// Stale intent stops both wheels and holds the lift. Write failures are
    /// logged once per fault and never propagated.
    pub fn tick(
        &mut self,
        now: Instant,
    ) {
        let stale = self.is_stale(now);
        if stale != self.stale {
            if stale {
                tracing::warn!("operator input went stale, stopping wheels");
            } else {
                tracing::info!("operator input resumed");
            }
            self.stale = stale;
        }

        let (vel_left, vel_right) = if stale {
            (0.0, 0.0)
        } else {
            self.kinematics
                .compute_wheel_velocities(self.intent.x, self.intent.y)
        };

        let mut ok = true;
        if let Err(error) = self.left.set_velocity(vel_left) {
            ok = false;
            if !self.faulted {
                tracing::error!(?error, "left motor write failed");
            }
        }
        if let Err(error) = self.right.set_velocity(vel_right) {
            ok = false;
            if !self.faulted {
                tracing::error!(?error, "right motor write failed");
            }
        }

        if !stale {
            if let Some(step) = self.kinematics.compute_lift_step(self.intent.e) {
                if let Err(error) = self.lift.increase(step) {
                    ok = false;
                    if !self.faulted {
                        tracing::error!(?error, "lift servo write failed");
                    }
                }
            }
        }

        if ok && self.faulted {
            tracing::info!("actuator writes recovered");
        }
        self.faulted = !ok;
    }

    /// Control loop: drain the intent slot and tick once per period, forever.
    pub async fn run(&mut self) -> ! {
        let mut ticker = Ticker::every(Duration::from_millis(self.control.period_ms));
        tracing::info!("control loop started");
        loop {
            self.poll(&INTENT_SIGNAL);
            self.tick(Instant::now());
            ticker.next().await;
        }
    }

    /// Give back the drivers and the status LED.
    pub fn release(self) -> (
        MotorDriver<PWM, PIN>,
        MotorDriver<PWM, PIN>,
        ServoDriver<LIFT>,
        Option<PIN>,
    ) {
        (self.left, self.right, self.lift, self.status)
    }
}

#[cfg(test)]
mod tests {
    use core::{cell::Cell, convert::Infallible};

    use embedded_hal::{digital, pwm};

    use super::*;

    /// Last values written to one fake hardware line.
    #[derive(Default)]
    struct Probe {
        duty: Cell<u16>,
        high: Cell<bool>,
    }

    struct Line<'a>(&'a Probe);

    impl pwm::ErrorType for Line<'_> {
        type Error = Infallible;
    }

    impl SetDutyCycle for Line<'_> {
        fn max_duty_cycle(&self) -> u16 {
            u16::MAX
        }

        fn set_duty_cycle(
            &mut self,
            duty: u16,
        ) -> Result<(), Infallible> {
            self.0.duty.set(duty);
            Ok(())
        }
    }

    impl digital::ErrorType for Line<'_> {
        type Error = Infallible;
    }

    impl OutputPin for Line<'_> {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.high.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.high.set(true);
            Ok(())
        }
    }

    /// Probes for left (speed, forward, back), right (same), the lift and the
    /// status LED.
    #[derive(Default)]
    struct Rig {
        probes: [Probe; 8],
    }

    impl Rig {
        fn controller(
            &self,
            control: ControlConfig,
        ) -> SystemController<Line<'_>, Line<'_>, Line<'_>> {
            self.try_controller(control).unwrap()
        }

        fn try_controller(
            &self,
            control: ControlConfig,
        ) -> Result<SystemController<Line<'_>, Line<'_>, Line<'_>>, CalibrationError> {
            let p = &self.probes;
            let motor = |base: usize| {
                MotorDriver::new(
                    Line(&p[base]),
                    Line(&p[base + 1]),
                    Line(&p[base + 2]),
                    MotorCalibration::default(),
                )
                .unwrap()
            };
            let lift = ServoDriver::new(Line(&p[6]), ServoCalibration::default()).unwrap();
            SystemController::new(motor(0), motor(3), lift, Some(Line(&p[7])), control)
        }

        fn led(&self) -> bool {
            self.probes[7].high.get()
        }

        /// (duty, forward, back) of the left motor.
        fn left(&self) -> (u16, bool, bool) {
            self.motor(0)
        }

        fn right(&self) -> (u16, bool, bool) {
            self.motor(3)
        }

        fn motor(
            &self,
            base: usize,
        ) -> (u16, bool, bool) {
            let p = &self.probes;
            (p[base].duty.get(), p[base + 1].high.get(), p[base + 2].high.get())
        }
    }

    fn sample(
        fields: [f32; 5],
        at_ms: u64,
    ) -> Sample {
        Sample::new(IntentVector::from_fields(fields), Instant::from_millis(at_ms))
    }

    #[test]
    fn test_neutral_before_any_sample() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        assert_eq!(ctrl.intent(), IntentVector::NEUTRAL);
        ctrl.tick(Instant::from_millis(10_000));
        assert_eq!(rig.left(), (30_000, false, false));
        assert_eq!(rig.right(), (30_000, false, false));
        assert_eq!(ctrl.lift_angle(), 0.0);
    }

    #[test]
    fn test_forward_full_speed() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        ctrl.ingest(sample([0.0, 1.0, 0.0, 0.0, 0.0], 0));
        ctrl.tick(Instant::from_millis(1));
        assert_eq!(rig.left(), (65_535, true, false));
        assert_eq!(rig.right(), (65_535, true, false));
    }

    #[test]
    fn test_pivot_opposite_directions() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        ctrl.ingest(sample([0.8, 0.0, 0.0, 0.0, 0.0], 0));
        ctrl.tick(Instant::from_millis(1));
        assert_eq!(rig.left(), (65_535, false, true));
        assert_eq!(rig.right(), (65_535, true, false));
    }

    #[test]
    fn test_lift_follows_elevation() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        ctrl.ingest(sample([0.0, 0.0, 0.0, 0.0, 1.0], 0));
        for ms in 1..=4 {
            ctrl.tick(Instant::from_millis(ms));
        }
        assert_eq!(ctrl.lift_angle(), 2.0);

        ctrl.ingest(sample([0.0, 0.0, 0.0, 0.0, -2.0], 5));
        ctrl.tick(Instant::from_millis(6));
        assert_eq!(ctrl.lift_angle(), 1.0);
    }

    #[test]
    fn test_stale_input_stops_wheels_and_holds_lift() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig {
            stale_after_ms: Some(100),
            ..Default::default()
        });
        ctrl.ingest(sample([0.0, 1.0, 0.0, 0.0, 1.0], 0));
        ctrl.tick(Instant::from_millis(100));
        assert_eq!(rig.left(), (65_535, true, false));
        assert_eq!(ctrl.lift_angle(), 0.5);

        ctrl.tick(Instant::from_millis(101));
        assert!(ctrl.is_stale(Instant::from_millis(101)));
        assert_eq!(rig.left(), (30_000, false, false));
        assert_eq!(rig.right(), (30_000, false, false));
        assert_eq!(ctrl.lift_angle(), 0.5);

        // a fresh sample resumes driving
        ctrl.ingest(sample([0.0, -1.0, 0.0, 0.0, 0.0], 150));
        ctrl.tick(Instant::from_millis(151));
        assert_eq!(rig.left(), (65_535, false, true));
    }

    #[test]
    fn test_without_timeout_last_intent_persists() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig {
            stale_after_ms: None,
            ..Default::default()
        });
        ctrl.ingest(sample([0.0, 1.0, 0.0, 0.0, 0.0], 0));
        ctrl.tick(Instant::from_millis(3_600_000));
        assert_eq!(rig.right(), (65_535, true, false));
    }

    #[test]
    fn test_poll_takes_newest_sample() {
        let slot = IntentSignal::new();
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        assert!(!ctrl.poll(&slot));

        slot.signal(sample([0.3, 0.0, 0.0, 0.0, 0.0], 1));
        slot.signal(sample([0.0, 0.5, 0.0, 0.0, 0.0], 2));
        assert!(ctrl.poll(&slot));
        assert_eq!(ctrl.intent().y, 0.5);
        assert_eq!(ctrl.intent().x, 0.0);

        // nothing pending: previous intent is kept
        assert!(!ctrl.poll(&slot));
        assert_eq!(ctrl.intent().y, 0.5);
    }

    #[test]
    fn test_default_config_keeps_held_stick_driving() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        ctrl.ingest(sample([0.0, 1.0, 0.0, 0.0, 0.0], 0));
        ctrl.tick(Instant::from_millis(1));
        assert_eq!(rig.left(), (65_535, true, false));

        // no new sample while the stick is held
        ctrl.tick(Instant::from_millis(600));
        assert!(!ctrl.is_stale(Instant::from_millis(600)));
        assert_eq!(rig.left(), (65_535, true, false));
        assert_eq!(rig.right(), (65_535, true, false));
    }

    #[test]
    fn test_status_led_lit_on_startup() {
        let rig = Rig::default();
        assert!(!rig.led());
        let _ctrl = rig.controller(ControlConfig::default());
        assert!(rig.led());
    }

    #[test]
    fn test_rejected_config_leaves_led_off() {
        let rig = Rig::default();
        let result = rig.try_controller(ControlConfig {
            period_ms: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(CalibrationError::ZeroPeriod)));
        assert!(!rig.led());
    }

    #[test]
    fn test_published_intent_reaches_controller() {
        let rig = Rig::default();
        let mut ctrl = rig.controller(ControlConfig::default());
        while INTENT_SIGNAL.try_take().is_some() {}

        publish(IntentVector::from_fields([0.8, 0.0, 0.0, 0.0, 0.0]));
        assert!(ctrl.poll(&INTENT_SIGNAL));
        assert_eq!(ctrl.intent().x, 0.8);

        ctrl.tick(Instant::now());
        assert_eq!(rig.left(), (65_535, false, true));
        assert_eq!(rig.right(), (65_535, true, false));
        assert!(!ctrl.poll(&INTENT_SIGNAL));
    }
}
