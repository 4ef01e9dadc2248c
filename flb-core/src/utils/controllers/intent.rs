//! Operator intent and the latest-value slot shared between the ingestion
//! and control tasks.
//!
//! The slot holds at most one `Sample`. Publishing overwrites whatever is
//! pending and never waits; the control task takes the sample without
//! blocking. The whole record moves under a critical section, so a reader
//! can never observe a half-written intent.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::Instant;

/// Single-slot, overwrite-on-publish channel carrying operator samples.
pub type IntentSignal = Signal<CriticalSectionRawMutex, Sample>;

/// Slot fed by the WebSocket endpoint and drained by the control loop.
pub static INTENT_SIGNAL: IntentSignal = Signal::new();

/// Normalized operator input.
///
/// `x`/`y` are lateral/forward intent in `[-1, 1]`, `e` is the signed lift
/// rate. `r` (radius) and `a` (angle) are carried by the wire format but not
/// used by the drive mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntentVector {
    pub x: f32,
    pub y: f32,
    pub r: f32,
    pub a: f32,
    pub e: f32,
}

impl IntentVector {
    /// All-zero intent: wheels idle, lift holding.
    pub const NEUTRAL: Self = Self {
        x: 0.0,
        y: 0.0,
        r: 0.0,
        a: 0.0,
        e: 0.0,
    };

    /// Build from fields in wire order `[x, y, r, a, e]`.
    pub const fn from_fields([x, y, r, a, e]: [f32; 5]) -> Self {
        Self { x, y, r, a, e }
    }
}

/// An intent together with the instant it was received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub intent: IntentVector,
    pub received_at: Instant,
}

impl Sample {
    pub fn new(
        intent: IntentVector,
        received_at: Instant,
    ) -> Self {
        Self {
            intent,
            received_at,
        }
    }
}

/// Stamp `intent` with the current time and make it the pending sample.
pub fn publish(intent: IntentVector) {
    INTENT_SIGNAL.signal(Sample::new(intent, Instant::now()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_neutral() {
        assert_eq!(IntentVector::default(), IntentVector::NEUTRAL);
    }

    #[test]
    fn test_field_order() {
        let v = IntentVector::from_fields([0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!((v.x, v.y, v.r, v.a, v.e), (0.1, 0.2, 0.3, 0.4, 0.5));
    }

    #[test]
    fn test_slot_keeps_newest_only() {
        let slot = IntentSignal::new();
        let t = Instant::from_millis(10);
        slot.signal(Sample::new(IntentVector::from_fields([1.0, 0.0, 0.0, 0.0, 0.0]), t));
        slot.signal(Sample::new(IntentVector::from_fields([0.0, 1.0, 0.0, 0.0, 0.0]), t));

        let newest = slot.try_take().unwrap();
        assert_eq!(newest.intent.y, 1.0);
        assert_eq!(newest.intent.x, 0.0);
        assert!(slot.try_take().is_none());
    }
}
