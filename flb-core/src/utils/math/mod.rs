//! Math utilities for the Forklift Bot.
//!
//! `numeric` holds the clamp/sign helpers; `kinematics` maps operator intent
//! onto the two drive wheels and the lift.

pub mod kinematics;
pub mod numeric;
