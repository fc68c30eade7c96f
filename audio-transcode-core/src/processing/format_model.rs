//! Destination format derivation.

use crate::models::error::TranscodeError;
use crate::models::format::{FormatId, NegotiatedFormat, SourceFormat};
use crate::models::profile::{DestinationProfile, RAW_BITS_PER_CHANNEL, RAW_FORMAT_FLAGS};

/// Derive the destination format for `source` under `profile`.
///
/// Overrides of 0 pass the source value through. Raw output is 16-bit
/// packed signed PCM with one frame per packet; encoded output has
/// variable-size packets (`bytes_per_frame == 0`).
pub fn derive(
    source: &SourceFormat,
    profile: DestinationProfile,
    sample_rate_override: f64,
    channel_override: u32,
) -> NegotiatedFormat {
    let channels = if channel_override != 0 {
        channel_override
    } else {
        source.channels
    };
    let sample_rate = if sample_rate_override != 0.0 {
        sample_rate_override
    } else {
        source.sample_rate
    };

    match profile {
        DestinationProfile::Raw => {
            let bytes_per_frame = channels * (RAW_BITS_PER_CHANNEL / 8);
            NegotiatedFormat {
                sample_rate,
                channels,
                format_id: FormatId::LinearPcm,
                format_flags: RAW_FORMAT_FLAGS,
                bytes_per_packet: bytes_per_frame,
                frames_per_packet: 1,
                bytes_per_frame,
                bits_per_channel: RAW_BITS_PER_CHANNEL,
            }
        }
        DestinationProfile::Encoded(codec) => {
            let spec = codec.spec();
            NegotiatedFormat {
                sample_rate,
                channels,
                format_id: spec.format_id,
                format_flags: spec.format_flags,
                bytes_per_packet: 0,
                frames_per_packet: spec.frames_per_packet,
                bytes_per_frame: 0,
                bits_per_channel: spec.bits_per_channel,
            }
        }
    }
}

/// As [`derive`], for a source that may not have been captured yet.
pub fn derive_from(
    source: Option<&SourceFormat>,
    profile: DestinationProfile,
    sample_rate_override: f64,
    channel_override: u32,
) -> Result<NegotiatedFormat, TranscodeError> {
    let source = source.ok_or(TranscodeError::MissingSourceFormat)?;
    Ok(derive(source, profile, sample_rate_override, channel_override))
}
