//! DC drive motor behind an H-bridge.
//!
//! Speed is a PWM line, direction is a pair of digital lines:
//!
//! | velocity | forward | back | duty                                  |
//! |----------|---------|------|---------------------------------------|
//! | `v > 0`  | high    | low  | `min + abs(v) * (max - min)`          |
//! | `v < 0`  | low     | high | `min + abs(v) * (max - min)`          |
//! | `v == 0` | low     | low  | `min` (coast)                         |
//!
//! The line being released is always written before the line being driven,
//! so forward and back are never high together.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};
use libm::{fabsf, roundf};

use super::calibration::{CalibrationError, MotorCalibration, DUTY_SCALE};
use crate::utils::math::numeric::clamp;

/// Errors raised while driving a motor.
#[derive(Debug)]
pub enum MotorError<P, D> {
    /// Writing the speed line failed.
    Pwm(P),
    /// Writing one of the direction lines failed.
    Pin(D),
}

/// One PWM-controlled DC motor with two direction lines.
pub struct MotorDriver<PWM, PIN> {
    speed: PWM,
    forward: PIN,
    back: PIN,
    calibration: MotorCalibration,
}

impl<PWM, PIN> MotorDriver<PWM, PIN>
where
    PWM: SetDutyCycle,
    PIN: OutputPin,
{
    /// Wrap the speed and direction lines of a single motor.
    ///
    /// Nothing is written to the hardware until the first `set_velocity`.
    pub fn new(
        speed: PWM,
        forward: PIN,
        back: PIN,
        calibration: MotorCalibration,
    ) -> Result<Self, CalibrationError> {
        calibration.validate()?;
        Ok(Self {
            speed,
            forward,
            back,
            calibration,
        })
    }

    pub fn calibration(&self) -> &MotorCalibration {
        &self.calibration
    }

    /// Duty value (16-bit scale) for velocity `v`. Only `abs(v)` matters and
    /// it saturates at 1.
    pub fn duty_for(
        &self,
        v: f32,
    ) -> u16 {
        let magnitude = clamp(fabsf(v), 0.0, 1.0);
        let min = self.calibration.min_duty as f32;
        let span = (self.calibration.max_duty - self.calibration.min_duty) as f32;
        roundf(min + magnitude * span) as u16
    }

    /// Drive the motor at normalized velocity `v`.
    pub fn set_velocity(
        &mut self,
        v: f32,
    ) -> Result<(), MotorError<PWM::Error, PIN::Error>> {
        let duty = self.duty_for(v);
        self.speed
            .set_duty_cycle_fraction(duty, DUTY_SCALE)
            .map_err(MotorError::Pwm)?;

        if v > 0.0 {
            self.back.set_low().map_err(MotorError::Pin)?;
            self.forward.set_high().map_err(MotorError::Pin)?;
        } else if v < 0.0 {
            self.forward.set_low().map_err(MotorError::Pin)?;
            self.back.set_high().map_err(MotorError::Pin)?;
        } else {
            self.forward.set_low().map_err(MotorError::Pin)?;
            self.back.set_low().map_err(MotorError::Pin)?;
        }
        Ok(())
    }

    /// Release both direction lines (coast).
    pub fn stop(&mut self) -> Result<(), MotorError<PWM::Error, PIN::Error>> {
        self.set_velocity(0.0)
    }

    /// Give back the speed, forward and back lines.
    pub fn release(self) -> (PWM, PIN, PIN) {
        (self.speed, self.forward, self.back)
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embedded_hal::{digital, pwm};

    use super::*;

    struct FakePwm {
        duty: u16,
    }

    impl pwm::ErrorType for FakePwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for FakePwm {
        fn max_duty_cycle(&self) -> u16 {
            u16::MAX
        }

        fn set_duty_cycle(
            &mut self,
            duty: u16,
        ) -> Result<(), Infallible> {
            self.duty = duty;
            Ok(())
        }
    }

    struct FakePin {
        high: bool,
    }

    impl digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    fn motor() -> MotorDriver<FakePwm, FakePin> {
        MotorDriver::new(
            FakePwm { duty: 0 },
            FakePin { high: true },
            FakePin { high: true },
            MotorCalibration::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_duty_endpoints() {
        let m = motor();
        assert_eq!(m.duty_for(0.0), 30_000);
        assert_eq!(m.duty_for(1.0), 65_535);
        assert_eq!(m.duty_for(-1.0), 65_535);
        // saturates rather than wrapping
        assert_eq!(m.duty_for(4.0), 65_535);
    }

    #[test]
    fn test_duty_monotonic_in_magnitude() {
        let m = motor();
        let mut last = 0;
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            let duty = m.duty_for(v);
            assert!(duty >= last, "duty dropped at v={}", v);
            assert_eq!(duty, m.duty_for(-v));
            last = duty;
        }
    }

    #[test]
    fn test_direction_lines_follow_sign() {
        let mut m = motor();

        m.set_velocity(0.5).unwrap();
        assert!(m.forward.high && !m.back.high);
        assert_eq!(m.speed.duty, m.duty_for(0.5));

        m.set_velocity(-0.25).unwrap();
        assert!(!m.forward.high && m.back.high);
        assert_eq!(m.speed.duty, m.duty_for(0.25));

        m.set_velocity(0.0).unwrap();
        assert!(!m.forward.high && !m.back.high);
        assert_eq!(m.speed.duty, 30_000);
    }

    #[test]
    fn test_inverted_calibration_rejected() {
        let cal = MotorCalibration {
            min_duty: 65_535,
            max_duty: 30_000,
            ..Default::default()
        };
        assert!(MotorDriver::new(
            FakePwm { duty: 0 },
            FakePin { high: false },
            FakePin { high: false },
            cal
        )
        .is_err());
    }
}
