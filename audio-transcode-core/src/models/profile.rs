use serde::{Deserialize, Serialize};

use super::format::{FormatId, FORMAT_FLAG_PACKED, FORMAT_FLAG_SIGNED_INTEGER};

/// `kMPEG4Object_AAC_LC`.
const MPEG4_OBJECT_AAC_LC: u32 = 2;
/// `kMPEG4Object_AAC_SBR`.
const MPEG4_OBJECT_AAC_SBR: u32 = 5;

/// Where an encoder implementation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Software,
    Hardware,
}

/// One candidate encoder implementation for a codec, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderCandidate {
    pub format_id: FormatId,
    pub kind: EncoderKind,
    pub manufacturer: [u8; 4],
}

/// Lossy codecs the session can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    AacLc,
    HeAac,
}

/// Fixed table entry describing an encoded destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    pub format_id: FormatId,
    pub format_flags: u32,
    pub frames_per_packet: u32,
    pub bits_per_channel: u32,
    pub candidates: &'static [EncoderCandidate],
}

const AAC_CANDIDATES: &[EncoderCandidate] = &[
    EncoderCandidate {
        format_id: FormatId::Mpeg4Aac,
        kind: EncoderKind::Software,
        manufacturer: *b"appl",
    },
    EncoderCandidate {
        format_id: FormatId::Mpeg4Aac,
        kind: EncoderKind::Hardware,
        manufacturer: *b"aphw",
    },
];

const HE_AAC_CANDIDATES: &[EncoderCandidate] = &[EncoderCandidate {
    format_id: FormatId::Mpeg4AacHe,
    kind: EncoderKind::Software,
    manufacturer: *b"appl",
}];

const AAC_LC: CodecSpec = CodecSpec {
    format_id: FormatId::Mpeg4Aac,
    format_flags: MPEG4_OBJECT_AAC_LC,
    frames_per_packet: 1024,
    bits_per_channel: 0,
    candidates: AAC_CANDIDATES,
};

const HE_AAC: CodecSpec = CodecSpec {
    format_id: FormatId::Mpeg4AacHe,
    format_flags: MPEG4_OBJECT_AAC_SBR,
    frames_per_packet: 2048,
    bits_per_channel: 0,
    candidates: HE_AAC_CANDIDATES,
};

impl Codec {
    pub fn spec(&self) -> &'static CodecSpec {
        match self {
            Self::AacLc => &AAC_LC,
            Self::HeAac => &HE_AAC,
        }
    }
}

/// Linear PCM flags used by the raw profile: signed integer, packed.
pub const RAW_FORMAT_FLAGS: u32 = FORMAT_FLAG_SIGNED_INTEGER | FORMAT_FLAG_PACKED;
/// Bit depth of the raw profile.
pub const RAW_BITS_PER_CHANNEL: u32 = 16;

/// Output the session negotiates towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "codec")]
pub enum DestinationProfile {
    Encoded(Codec),
    Raw,
}

impl DestinationProfile {
    /// Encoder implementations to try. Empty means the system default.
    pub fn candidates(&self) -> &'static [EncoderCandidate] {
        match self {
            Self::Encoded(codec) => codec.spec().candidates,
            Self::Raw => &[],
        }
    }
}

impl Default for DestinationProfile {
    fn default() -> Self {
        Self::Encoded(Codec::AacLc)
    }
}
