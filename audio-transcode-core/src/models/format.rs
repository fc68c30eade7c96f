use serde::{Deserialize, Serialize};

/// `kAudioFormatFlagIsSignedInteger`.
pub const FORMAT_FLAG_SIGNED_INTEGER: u32 = 1 << 2;
/// `kAudioFormatFlagIsPacked`.
pub const FORMAT_FLAG_PACKED: u32 = 1 << 3;

/// Numeric representation of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Float,
    SignedInteger,
}

/// Format of the raw audio delivered by the producer.
///
/// Captured from the first sample buffer after start or invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceFormat {
    pub sample_rate: f64,
    pub channels: u32,
    pub bits_per_channel: u32,
    pub interleaved: bool,
    pub sample_kind: SampleKind,
}

impl SourceFormat {
    /// Interleaved 32-bit float, the usual capture format.
    pub fn float32(sample_rate: f64, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_channel: 32,
            interleaved: true,
            sample_kind: SampleKind::Float,
        }
    }

    /// Interleaved signed 16-bit integer.
    pub fn int16(sample_rate: f64, channels: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_channel: 16,
            interleaved: true,
            sample_kind: SampleKind::SignedInteger,
        }
    }

    pub fn planar(self) -> Self {
        Self {
            interleaved: false,
            ..self
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_channel / 8) as usize
    }

    /// Number of buffers a buffer list for this format needs:
    /// one if interleaved, one per channel otherwise.
    pub fn buffer_count(&self) -> usize {
        if self.interleaved {
            1
        } else {
            self.channels.max(1) as usize
        }
    }

    /// Channels carried by each buffer of a buffer list.
    pub fn channels_per_buffer(&self) -> u32 {
        if self.interleaved {
            self.channels
        } else {
            1
        }
    }
}

/// Identifier of an audio data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatId {
    LinearPcm,
    Mpeg4Aac,
    Mpeg4AacHe,
}

impl FormatId {
    /// Four-character code used by platform codecs.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::LinearPcm => *b"lpcm",
            Self::Mpeg4Aac => *b"aac ",
            Self::Mpeg4AacHe => *b"aach",
        }
    }

    pub fn is_linear_pcm(&self) -> bool {
        matches!(self, Self::LinearPcm)
    }
}

/// Encoder properties the session sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncoderProperty {
    /// `kAudioConverterEncodeBitRate`, in bits per second across all channels.
    EncodeBitRate,
}

/// Destination format negotiated for the current source.
///
/// Structural equality decides whether the consumer hears about a change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    pub sample_rate: f64,
    pub channels: u32,
    pub format_id: FormatId,
    pub format_flags: u32,
    /// 0 for variable-size (encoded) packets.
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    /// 0 for encoded formats.
    pub bytes_per_frame: u32,
    pub bits_per_channel: u32,
}

impl NegotiatedFormat {
    pub fn is_encoded(&self) -> bool {
        !self.format_id.is_linear_pcm()
    }
}
