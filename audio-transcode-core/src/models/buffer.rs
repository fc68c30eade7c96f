use serde::{Deserialize, Serialize};

use super::error::TranscodeError;
use super::format::SourceFormat;

/// Rational media timestamp: `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PresentationTime {
    pub value: i64,
    pub timescale: u32,
}

impl PresentationTime {
    pub fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }
}

/// A timestamped chunk of raw audio as delivered by the producer.
///
/// Planar blocks store each channel's samples contiguously, channel after
/// channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    format: Option<SourceFormat>,
    presentation_time: PresentationTime,
    block: Option<Vec<u8>>,
}

impl SampleBuffer {
    pub fn new(format: SourceFormat, presentation_time: PresentationTime, block: Vec<u8>) -> Self {
        Self {
            format: Some(format),
            presentation_time,
            block: Some(block),
        }
    }

    /// Build from f32 samples laid out as `format` describes.
    pub fn from_f32(format: SourceFormat, presentation_time: PresentationTime, samples: &[f32]) -> Self {
        let block = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(format, presentation_time, block)
    }

    /// Build from i16 samples laid out as `format` describes.
    pub fn from_i16(format: SourceFormat, presentation_time: PresentationTime, samples: &[i16]) -> Self {
        let block = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(format, presentation_time, block)
    }

    /// A buffer carrying a format description but no sample data.
    pub fn without_block(format: SourceFormat, presentation_time: PresentationTime) -> Self {
        Self {
            format: Some(format),
            presentation_time,
            block: None,
        }
    }

    /// A buffer carrying sample data but no format description.
    pub fn without_format(presentation_time: PresentationTime, block: Vec<u8>) -> Self {
        Self {
            format: None,
            presentation_time,
            block: Some(block),
        }
    }

    pub fn format(&self) -> Option<&SourceFormat> {
        self.format.as_ref()
    }

    pub fn presentation_time(&self) -> PresentationTime {
        self.presentation_time
    }

    pub fn block(&self) -> Option<&[u8]> {
        self.block.as_deref()
    }
}

/// One buffer of a buffer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    /// Interleaved channels in this buffer (1 for planar layouts).
    pub channels: u32,
    pub data: Vec<u8>,
}

/// Sample data extracted from a `SampleBuffer`, ready for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBufferList {
    buffers: Vec<AudioBuffer>,
    frames: usize,
}

impl AudioBufferList {
    /// Split a block into one buffer (interleaved) or one per channel (planar).
    pub fn extract(block: &[u8], format: &SourceFormat) -> Result<Self, TranscodeError> {
        let bytes_per_sample = format.bytes_per_sample();
        if bytes_per_sample == 0 || format.channels == 0 || format.bits_per_channel % 8 != 0 {
            return Err(TranscodeError::MalformedInput(format!(
                "unusable format: {} channels, {} bits",
                format.channels, format.bits_per_channel
            )));
        }

        let frame_bytes = bytes_per_sample * format.channels as usize;
        if block.len() % frame_bytes != 0 {
            return Err(TranscodeError::MalformedInput(format!(
                "block of {} bytes is not a whole number of {}-byte frames",
                block.len(),
                frame_bytes
            )));
        }

        let frames = block.len() / frame_bytes;
        let buffer_count = format.buffer_count();
        let buffer_len = block.len() / buffer_count;

        let mut buffers = Vec::with_capacity(buffer_count);
        for chunk in block.chunks(buffer_len.max(1)).take(buffer_count) {
            buffers.push(AudioBuffer {
                channels: format.channels_per_buffer(),
                data: chunk.to_vec(),
            });
        }
        // Empty blocks still yield a full list of empty buffers.
        while buffers.len() < buffer_count {
            buffers.push(AudioBuffer {
                channels: format.channels_per_buffer(),
                data: Vec::new(),
            });
        }

        Ok(Self { buffers, frames })
    }

    pub fn buffers(&self) -> &[AudioBuffer] {
        &self.buffers
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn byte_len(&self) -> usize {
        self.buffers.iter().map(|b| b.data.len()).sum()
    }

    /// Zero all sample memory (mute).
    pub fn silence(&mut self) {
        for buffer in &mut self.buffers {
            buffer.data.fill(0);
        }
    }

    pub fn is_silent(&self) -> bool {
        self.buffers.iter().all(|b| b.data.iter().all(|&byte| byte == 0))
    }
}

/// Temporary output buffer for one encoded packet.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    data: Vec<u8>,
    frames: u32,
}

impl PacketBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            frames: 0,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Record how many input frames this packet covers.
    pub fn set_frames(&mut self, frames: u32) {
        self.frames = frames;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
