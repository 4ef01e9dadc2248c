//! Differential-drive mapping for the Forklift Bot.
//!
//! `DifferentialKinematics` turns the operator's `(x, y)` stick position into
//! independent left/right wheel velocities, and the elevation input `e` into a
//! lift step. The mapping is a hand-tuned heuristic with three regimes:
//!
//! - **pivot**: strong lateral input with almost no forward input rotates the
//!   bot about its center, using a turning scale that stays finite at the two
//!   singular headings `y = ±1`;
//! - **straight**: negligible lateral input drives both wheels at `y`;
//! - **soft turn**: one wheel at full speed, the inner one crawling.
//!
//! # Example
//! ```rust
//! use flb_core::utils::math::kinematics::DifferentialKinematics;
//! let kin = DifferentialKinematics::default();
//! let (left, right) = kin.compute_wheel_velocities(0.8, 0.0);
//! assert_eq!((left, right), (-1.0, 1.0));
//! ```
use libm::fabsf;

use super::numeric::{clamp, sign};

/// Lateral magnitude above which the pivot regime may apply.
pub const PIVOT_X_THRESHOLD: f32 = 0.7;
/// Forward magnitude below which the pivot regime may apply.
pub const PIVOT_Y_THRESHOLD: f32 = 0.25;
/// Lateral magnitude below which the input counts as straight.
pub const STRAIGHT_X_THRESHOLD: f32 = 0.05;
/// Speed of the inner wheel during a soft turn.
pub const CRAWL_SPEED: f32 = 0.005;
/// Default lift step in degrees per tick at full elevation input.
pub const DEFAULT_LIFT_RATE: f32 = 0.5;

/// Mapping branch selected for a given `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveRegime {
    /// Rotation about a near-stationary center.
    Pivot,
    /// Pure forward/backward motion.
    Straight,
    /// One wheel at full speed, the other crawling.
    SoftTurn,
}

/// Maps operator intent onto wheel velocities and lift steps.
#[derive(Debug, Clone, Copy)]
pub struct DifferentialKinematics {
    /// Lift step in degrees per tick for `e = 1`.
    lift_rate: f32,
}

impl Default for DifferentialKinematics {
    fn default() -> Self {
        Self::new(DEFAULT_LIFT_RATE)
    }
}

impl DifferentialKinematics {
    /// Instantiate with the given lift rate (degrees per tick).
    pub fn new(lift_rate: f32) -> Self {
        Self { lift_rate }
    }

    /// Select the branch that applies to `(x, y)`. First match wins.
    pub fn regime(
        x: f32,
        y: f32,
    ) -> DriveRegime {
        if fabsf(x) > PIVOT_X_THRESHOLD && fabsf(y) < PIVOT_Y_THRESHOLD {
            DriveRegime::Pivot
        } else if fabsf(x) < STRAIGHT_X_THRESHOLD {
            DriveRegime::Straight
        } else {
            DriveRegime::SoftTurn
        }
    }

    /// Turning scale `L` used by the pivot regime.
    ///
    /// The candidates `x/(y+1)` and `-x/(y+1)` are only considered when
    /// `y != -1`, and `x/(y-1)` and `x/(1-y)` only when `y != 1`. `L` is the
    /// absolute value of the largest candidate, or `1.0` when that is zero.
    pub fn turn_scale(
        x: f32,
        y: f32,
    ) -> f32 {
        let mut candidates = [f32::NEG_INFINITY; 4];
        if y != -1.0 {
            candidates[0] = x / (y + 1.0);
            candidates[1] = -x / (y + 1.0);
        }
        if y != 1.0 {
            candidates[2] = x / (y - 1.0);
            candidates[3] = x / (1.0 - y);
        }

        let largest = fabsf(candidates.iter().copied().fold(f32::NEG_INFINITY, f32::max));
        if largest == 0.0 {
            1.0
        } else {
            largest
        }
    }

    /// Compute `(vel_left, vel_right)` for the stick position `(x, y)`.
    ///
    /// Both velocities are clamped to `[-1, 1]`.
    pub fn compute_wheel_velocities(
        &self,
        x: f32,
        y: f32,
    ) -> (f32, f32) {
        let (left, right) = match Self::regime(x, y) {
            DriveRegime::Pivot => {
                let l = Self::turn_scale(x, y);
                (y - x / l, x / l + y)
            }
            DriveRegime::Straight => (y, y),
            DriveRegime::SoftTurn => {
                let full = sign(y);
                let crawl = CRAWL_SPEED * sign(y);
                if x <= 0.0 {
                    (crawl, full)
                } else {
                    (full, crawl)
                }
            }
        };
        (clamp(left, -1.0, 1.0), clamp(right, -1.0, 1.0))
    }

    /// Lift step in degrees for elevation input `e`, or `None` when idle.
    pub fn compute_lift_step(
        &self,
        e: f32,
    ) -> Option<f32> {
        if e != 0.0 {
            Some(self.lift_rate * e)
        } else {
            None
        }
    }
}
