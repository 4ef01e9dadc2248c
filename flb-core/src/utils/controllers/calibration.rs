//! Calibration for the drive motors, the lift servo and the control loop.
//!
//! Duty values are expressed in 16-bit units (`0..=65535`) regardless of the
//! resolution of the underlying PWM peripheral; drivers rescale them with
//! `SetDutyCycle::set_duty_cycle_fraction`.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::math::kinematics::DEFAULT_LIFT_RATE;

/// Full-scale duty value that calibration bounds are expressed against.
pub const DUTY_SCALE: u16 = u16::MAX;

/// Construction-time calibration contract violations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    /// `max_duty` must be strictly greater than `min_duty`.
    InvertedDuty { min_duty: u16, max_duty: u16 },
    /// `max_angle` must be strictly greater than `min_angle`.
    InvertedAngle { min_angle: f32, max_angle: f32 },
    /// `rest_angle` lies outside `[min_angle, max_angle]`.
    RestOutOfRange { rest_angle: f32 },
    /// A PWM line cannot run at 0 Hz.
    ZeroFrequency,
    /// The control loop period must be at least one millisecond.
    ZeroPeriod,
}

impl fmt::Display for CalibrationError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::InvertedDuty { min_duty, max_duty } => {
                write!(f, "duty range {}..{} is empty or inverted", min_duty, max_duty)
            }
            Self::InvertedAngle {
                min_angle,
                max_angle,
            } => write!(f, "angle range {}..{} is empty or inverted", min_angle, max_angle),
            Self::RestOutOfRange { rest_angle } => {
                write!(f, "rest angle {} is outside the angle range", rest_angle)
            }
            Self::ZeroFrequency => f.write_str("PWM frequency must be non-zero"),
            Self::ZeroPeriod => f.write_str("control period must be non-zero"),
        }
    }
}

/// Duty bounds for one drive motor.
///
/// Below `min_duty` the motor stalls; `max_duty` is full speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorCalibration {
    pub min_duty: u16,
    pub max_duty: u16,
    /// PWM frequency in Hz.
    pub pwm_freq: u32,
}

impl Default for MotorCalibration {
    fn default() -> Self {
        Self {
            min_duty: 30_000,
            max_duty: 65_535,
            pwm_freq: 1_500,
        }
    }
}

impl MotorCalibration {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.max_duty <= self.min_duty {
            return Err(CalibrationError::InvertedDuty {
                min_duty: self.min_duty,
                max_duty: self.max_duty,
            });
        }
        if self.pwm_freq == 0 {
            return Err(CalibrationError::ZeroFrequency);
        }
        Ok(())
    }
}

/// Duty and angle bounds for the lift servo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoCalibration {
    pub min_duty: u16,
    pub max_duty: u16,
    /// Degrees.
    pub min_angle: f32,
    /// Degrees.
    pub max_angle: f32,
    /// Angle the servo returns to on reset.
    pub rest_angle: f32,
    /// PWM frequency in Hz.
    pub pwm_freq: u32,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            min_duty: 870,
            max_duty: 7_300,
            min_angle: -90.0,
            max_angle: 90.0,
            rest_angle: 0.0,
            pwm_freq: 50,
        }
    }
}

impl ServoCalibration {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.max_duty <= self.min_duty {
            return Err(CalibrationError::InvertedDuty {
                min_duty: self.min_duty,
                max_duty: self.max_duty,
            });
        }
        // written as a negation so NaN bounds are rejected too
        if !(self.max_angle > self.min_angle) {
            return Err(CalibrationError::InvertedAngle {
                min_angle: self.min_angle,
                max_angle: self.max_angle,
            });
        }
        if !(self.min_angle..=self.max_angle).contains(&self.rest_angle) {
            return Err(CalibrationError::RestOutOfRange {
                rest_angle: self.rest_angle,
            });
        }
        if self.pwm_freq == 0 {
            return Err(CalibrationError::ZeroFrequency);
        }
        Ok(())
    }
}

/// Timing of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Period of the control loop in milliseconds.
    pub period_ms: u64,
    /// Age in milliseconds after which the last sample stops driving the
    /// wheels. `None` (the default) keeps the last sample driving until
    /// a newer one arrives.
    pub stale_after_ms: Option<u64>,
    /// Lift step in degrees per tick at full elevation input.
    pub lift_rate: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_ms: 1,
            stale_after_ms: None,
            lift_rate: DEFAULT_LIFT_RATE,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.period_ms == 0 {
            return Err(CalibrationError::ZeroPeriod);
        }
        Ok(())
    }
}

/// Complete robot configuration, as loaded by the host binaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub left_motor: MotorCalibration,
    pub right_motor: MotorCalibration,
    pub lift: ServoCalibration,
    pub control: ControlConfig,
}

impl RobotConfig {
    /// Check every section, reporting the first violation.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.left_motor.validate()?;
        self.right_motor.validate()?;
        self.lift.validate()?;
        self.control.validate()
    }
}
