//! # audio-transcode-core
//!
//! Platform-agnostic adaptive audio transcoding core.
//!
//! Accepts raw sample buffers of initially unknown format, negotiates an
//! output format lazily, drives a pull-based encoder and hands timestamped
//! packets to a delegate. Platform codecs (Core Audio converters, software
//! encoders) implement the `PullEncoder` trait and plug into the generic
//! `TranscodeSession`.
//!
//! ## Architecture
//!
//! ```text
//! audio-transcode-core (this crate)
//! ├── traits/       ← PullEncoder, EncoderHandle, InputDataProc, TranscodeDelegate
//! ├── models/       ← formats, profiles, buffers, settings, errors, diagnostics
//! ├── processing/   ← format derivation, bitrate descent, single-shot BufferAdapter
//! └── session/      ← TranscodeSession (encode loop + control queue)
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use models::buffer::{AudioBuffer, AudioBufferList, PacketBuffer, PresentationTime, SampleBuffer};
pub use models::diagnostics::TranscodeDiagnostics;
pub use models::error::{EncoderStatus, TranscodeError};
pub use models::format::{EncoderProperty, FormatId, NegotiatedFormat, SampleKind, SourceFormat};
pub use models::profile::{Codec, CodecSpec, DestinationProfile, EncoderCandidate, EncoderKind};
pub use models::settings::TranscodeSettings;
pub use models::state::{DrainEnd, EncodeOutcome, TranscodeState};
pub use processing::bitrate::MINIMUM_BITRATE;
pub use processing::buffer_adapter::BufferAdapter;
pub use session::control::ControlTicket;
pub use session::transcoder::TranscodeSession;
pub use traits::delegate::TranscodeDelegate;
pub use traits::encoder::{EncoderHandle, InputDataProc, InputDelivery, PullEncoder};
