//! Best-effort bitrate negotiation against an encoder that may reject values.

use crate::models::error::TranscodeError;
use crate::models::format::EncoderProperty;
use crate::traits::encoder::EncoderHandle;

/// Descent step, and the floor the actual bitrate is pinned to.
pub const MINIMUM_BITRATE: u32 = 8 * 1024;

/// Result of one negotiation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateNegotiation {
    /// Per-channel bitrate now in effect (or pinned to the minimum).
    pub actual: u32,
    /// Unscaled values tried, in order.
    pub attempts: Vec<u32>,
    pub accepted: bool,
}

/// Apply `requested` (per channel) to `encoder`, stepping down by
/// [`MINIMUM_BITRATE`] on every rejection.
///
/// The encoder sees `value * channels`. Once a rejected value is at or below
/// the minimum step, the actual bitrate is pinned to the minimum.
pub fn negotiate(encoder: &mut dyn EncoderHandle, requested: u32, channels: u32) -> BitrateNegotiation {
    let mut value = requested;
    let mut attempts = Vec::new();

    loop {
        attempts.push(value);
        match encoder.set_property(EncoderProperty::EncodeBitRate, value.saturating_mul(channels)) {
            Ok(()) => {
                log::debug!("bitrate {} x {} channels accepted", value, channels);
                return BitrateNegotiation {
                    actual: value,
                    attempts,
                    accepted: true,
                };
            }
            Err(status) => {
                let rejection = TranscodeError::PropertySetRejected {
                    property: EncoderProperty::EncodeBitRate,
                    status,
                };
                log::debug!("bitrate {} x {} channels: {}", value, channels, rejection);
                if MINIMUM_BITRATE < value {
                    value -= MINIMUM_BITRATE;
                } else {
                    return BitrateNegotiation {
                        actual: MINIMUM_BITRATE,
                        attempts,
                        accepted: false,
                    };
                }
            }
        }
    }
}
