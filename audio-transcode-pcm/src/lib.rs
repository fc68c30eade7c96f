//! # audio-transcode-pcm
//!
//! Software collaborators for `audio-transcode-core`.
//!
//! Provides:
//! - `LinearPcmEncoder`: `PullEncoder` for the raw profile (16-bit packed PCM)
//! - `WavPacketSink`: `TranscodeDelegate` writing raw packets to a WAV file
//! - `WavHeader`: RIFF header for the raw profile, written up front and finalized in place
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_transcode_core::{DestinationProfile, TranscodeSession, TranscodeSettings};
//! use audio_transcode_pcm::{LinearPcmEncoder, WavPacketSink};
//!
//! let settings = TranscodeSettings { profile: DestinationProfile::Raw, ..Default::default() };
//! let session = TranscodeSession::with_settings(LinearPcmEncoder::new(), settings)?;
//! let sink = Arc::new(WavPacketSink::new("out.wav"));
//! session.set_delegate(sink.clone());
//! session.start();
//! ```

pub mod pcm_encoder;
pub mod wav_format;
pub mod wav_sink;

pub use pcm_encoder::{LinearPcmEncoder, FRAMES_PER_UNIT};
pub use wav_format::WavHeader;
pub use wav_sink::{SinkError, WavPacketSink};
