use thiserror::Error;

use super::format::EncoderProperty;

/// Status codes reported by an encoder handle or its input callback.
///
/// Mirrors the small set of OS status codes the session reacts to; anything
/// else is carried verbatim in `Other`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStatus {
    /// The encoder misreported the input size. Treated as a normal end of packets.
    #[error("invalid input size")]
    InvalidInputSize,

    /// The input callback has nothing left for the current encode call.
    #[error("input exhausted")]
    InputExhausted,

    #[error("property not supported")]
    PropertyNotSupported,

    #[error("format not supported")]
    FormatNotSupported,

    #[error("encoder status {0}")]
    Other(i32),
}

/// Errors that can occur while negotiating or driving a transcoding session.
///
/// None of these cross the consumer boundary; they are logged, counted, or
/// returned to the producer inside an `EncodeOutcome`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TranscodeError {
    #[error("encoder rejected {property:?}: {status}")]
    PropertySetRejected {
        property: EncoderProperty,
        status: EncoderStatus,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("source format changed without invalidation")]
    SourceFormatChanged,

    #[error("resampling {source_rate} Hz to {target_rate} Hz is not supported")]
    UnsupportedResample { source_rate: f64, target_rate: f64 },

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(EncoderStatus),

    #[error("no source format captured")]
    MissingSourceFormat,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("control queue closed")]
    ControlQueueClosed,

    #[error("failed to spawn control queue: {0}")]
    ControlQueueSpawn(String),
}
