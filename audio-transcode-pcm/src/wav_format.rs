//! RIFF/WAVE header for the raw profile's packed 16-bit output.

use std::io::{self, Seek, SeekFrom, Write};

use audio_transcode_core::NegotiatedFormat;

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_SIZE: usize = 44;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
/// Header bytes counted by the RIFF chunk size besides the sample data.
const RIFF_OVERHEAD: u32 = WAV_HEADER_SIZE as u32 - 8;
const PCM_FORMAT_TAG: u16 = 1;

/// `fmt ` chunk parameters of a linear-PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavHeader {
    /// Header for a negotiated linear-PCM format; `None` for encoded formats.
    pub fn for_format(format: &NegotiatedFormat) -> Option<Self> {
        if format.is_encoded() {
            return None;
        }
        Some(Self {
            sample_rate: format.sample_rate.round() as u32,
            channels: u16::try_from(format.channels).ok()?,
            bits_per_sample: u16::try_from(format.bits_per_channel).ok()?,
        })
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Serialize with `data_size` bytes of samples following.
    pub fn to_bytes(&self, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
        let mut out = [0u8; WAV_HEADER_SIZE];
        let fields: [&[u8]; 13] = [
            b"RIFF",
            &(RIFF_OVERHEAD + data_size).to_le_bytes(),
            b"WAVE",
            b"fmt ",
            &16u32.to_le_bytes(),
            &PCM_FORMAT_TAG.to_le_bytes(),
            &self.channels.to_le_bytes(),
            &self.sample_rate.to_le_bytes(),
            &self.byte_rate().to_le_bytes(),
            &self.block_align().to_le_bytes(),
            &self.bits_per_sample.to_le_bytes(),
            b"data",
            &data_size.to_le_bytes(),
        ];
        let mut at = 0;
        for field in fields {
            out[at..at + field.len()].copy_from_slice(field);
            at += field.len();
        }
        out
    }

    /// Rewrite the size fields of a header already at the start of `writer`.
    ///
    /// Sizes past the 32-bit limit are clamped. The writer's position is
    /// left after the data size field.
    pub fn finalize<W: Write + Seek>(writer: &mut W, data_size: u64) -> io::Result<()> {
        let data_size = data_size.min((u32::MAX - RIFF_OVERHEAD) as u64) as u32;
        writer.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        writer.write_all(&(RIFF_OVERHEAD + data_size).to_le_bytes())?;
        writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        writer.write_all(&data_size.to_le_bytes())?;
        writer.flush()
    }
}
