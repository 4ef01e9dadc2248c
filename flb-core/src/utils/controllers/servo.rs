//! Position servo driving the lift.
//!
//! The servo is the only stateful actuator: it remembers the last commanded
//! angle so the controller can nudge it by a rate every tick. The stored angle
//! never leaves `[min_angle, max_angle]`.

use embedded_hal::pwm::SetDutyCycle;
use libm::roundf;

use super::calibration::{CalibrationError, ServoCalibration, DUTY_SCALE};
use crate::utils::math::numeric::clamp;

/// Errors raised while constructing or driving the servo.
#[derive(Debug)]
pub enum ServoError<P> {
    /// Calibration rejected at construction.
    Calibration(CalibrationError),
    /// Writing the PWM line failed.
    Pwm(P),
}

impl<P> From<CalibrationError> for ServoError<P> {
    fn from(e: CalibrationError) -> Self {
        ServoError::Calibration(e)
    }
}

/// A PWM position servo with calibrated angle and duty ranges.
pub struct ServoDriver<PWM> {
    pwm: PWM,
    calibration: ServoCalibration,
    angle: f32,
}

impl<PWM> ServoDriver<PWM>
where
    PWM: SetDutyCycle,
{
    /// Validate the calibration and move the servo to its rest angle.
    pub fn new(
        pwm: PWM,
        calibration: ServoCalibration,
    ) -> Result<Self, ServoError<PWM::Error>> {
        calibration.validate()?;
        let mut servo = Self {
            pwm,
            calibration,
            angle: calibration.rest_angle,
        };
        servo.reset()?;
        Ok(servo)
    }

    /// Last commanded angle in degrees.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn calibration(&self) -> &ServoCalibration {
        &self.calibration
    }

    /// Duty value (16-bit scale) for `angle`, after clamping it into range.
    pub fn duty_for(
        &self,
        angle: f32,
    ) -> u16 {
        let c = &self.calibration;
        let angle = clamp(angle, c.min_angle, c.max_angle);
        let duty_span = (c.max_duty - c.min_duty) as f32;
        let angle_span = c.max_angle - c.min_angle;
        roundf((angle - c.min_angle) * duty_span / angle_span + c.min_duty as f32) as u16
    }

    /// Move to `angle` (clamped into range).
    pub fn set(
        &mut self,
        angle: f32,
    ) -> Result<(), ServoError<PWM::Error>> {
        self.angle = clamp(angle, self.calibration.min_angle, self.calibration.max_angle);
        let duty = self.duty_for(self.angle);
        self.pwm
            .set_duty_cycle_fraction(duty, DUTY_SCALE)
            .map_err(ServoError::Pwm)
    }

    /// Raise the angle by `rate` degrees. A no-op once pinned at the bound.
    pub fn increase(
        &mut self,
        rate: f32,
    ) -> Result<(), ServoError<PWM::Error>> {
        self.step_to(self.angle + rate)
    }

    /// Lower the angle by `rate` degrees. A no-op once pinned at the bound.
    pub fn decrease(
        &mut self,
        rate: f32,
    ) -> Result<(), ServoError<PWM::Error>> {
        self.step_to(self.angle - rate)
    }

    /// Return to the rest angle.
    pub fn reset(&mut self) -> Result<(), ServoError<PWM::Error>> {
        self.set(self.calibration.rest_angle)
    }

    pub fn release(self) -> PWM {
        self.pwm
    }

    fn step_to(
        &mut self,
        target: f32,
    ) -> Result<(), ServoError<PWM::Error>> {
        let target = clamp(target, self.calibration.min_angle, self.calibration.max_angle);
        if target != self.angle {
            self.set(target)
        } else {
            Ok(())
        }
    }
}
