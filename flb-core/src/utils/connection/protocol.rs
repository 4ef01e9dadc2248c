//! Wire format for operator samples.
//!
//! Each sample is the text `[x,y,r,a,e]`: five decimal numbers in fixed
//! order, which is also a JSON array, so decoding goes through `serde_json`.
//! Anything else decodes to the neutral intent rather than a partial one.

use libm::fabsf;

use crate::utils::controllers::IntentVector;

/// Reasons a record is rejected.
#[derive(Debug)]
pub enum DecodeError {
    /// Not a five-element array of numbers.
    Malformed(serde_json::Error),
    /// A field overflowed `f32` or is otherwise not finite.
    NonFinite,
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e)
    }
}

fn from_fields(fields: [f32; 5]) -> Result<IntentVector, DecodeError> {
    if fields.iter().all(|v| fabsf(*v) <= f32::MAX) {
        Ok(IntentVector::from_fields(fields))
    } else {
        Err(DecodeError::NonFinite)
    }
}

/// Decode a text record.
pub fn decode(record: &str) -> Result<IntentVector, DecodeError> {
    from_fields(serde_json::from_str::<[f32; 5]>(record)?)
}

/// Decode a record carried in a binary frame.
pub fn decode_bytes(record: &[u8]) -> Result<IntentVector, DecodeError> {
    from_fields(serde_json::from_slice::<[f32; 5]>(record)?)
}

/// Decode a text record, substituting the neutral intent on failure.
pub fn decode_or_neutral(record: &str) -> IntentVector {
    decode(record).unwrap_or_else(|error| {
        tracing::warn!(?error, "dropping malformed record");
        IntentVector::NEUTRAL
    })
}

/// Binary counterpart of [`decode_or_neutral`].
pub fn decode_bytes_or_neutral(record: &[u8]) -> IntentVector {
    decode_bytes(record).unwrap_or_else(|error| {
        tracing::warn!(?error, "dropping malformed record");
        IntentVector::NEUTRAL
    })
}
