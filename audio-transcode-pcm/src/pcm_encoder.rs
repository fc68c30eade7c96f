//! Software linear-PCM encoder for the raw destination profile.
//!
//! Converts f32, i16 or i32 input (interleaved or planar) into packed,
//! interleaved little-endian i16. Channel counts may be kept, duplicated from
//! mono, or averaged down to mono. Sample rates are never converted.

use audio_transcode_core::{
    AudioBufferList, EncoderCandidate, EncoderHandle, EncoderProperty, EncoderStatus, InputDataProc,
    NegotiatedFormat, PacketBuffer, PullEncoder, SampleKind, SourceFormat,
};

/// Maximum frames carried by one output packet.
pub const FRAMES_PER_UNIT: usize = 1024;

const OUTPUT_BYTES_PER_SAMPLE: usize = 2;
const SAMPLE_RATE_TOLERANCE: f64 = 0.01;

/// `PullEncoder` producing 16-bit linear PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearPcmEncoder;

impl LinearPcmEncoder {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelMap {
    Direct,
    /// Mono source copied into every output channel.
    Duplicate,
    /// All source channels averaged into one.
    Downmix,
}

fn channel_map(source: u32, destination: u32) -> Option<ChannelMap> {
    match (source, destination) {
        (0, _) | (_, 0) => None,
        (s, d) if s == d => Some(ChannelMap::Direct),
        (1, _) => Some(ChannelMap::Duplicate),
        (_, 1) => Some(ChannelMap::Downmix),
        _ => None,
    }
}

fn supported_source(source: &SourceFormat) -> bool {
    matches!(
        (source.sample_kind, source.bits_per_channel),
        (SampleKind::Float, 32) | (SampleKind::SignedInteger, 16) | (SampleKind::SignedInteger, 32)
    )
}

impl PullEncoder for LinearPcmEncoder {
    fn create(
        &self,
        source: &SourceFormat,
        destination: &NegotiatedFormat,
        _candidates: &[EncoderCandidate],
    ) -> Result<Box<dyn EncoderHandle>, EncoderStatus> {
        if !destination.format_id.is_linear_pcm() || destination.bits_per_channel != 16 {
            log::warn!(
                "linear PCM encoder cannot produce {:?} at {} bits",
                destination.format_id,
                destination.bits_per_channel
            );
            return Err(EncoderStatus::FormatNotSupported);
        }
        if !supported_source(source) {
            log::warn!(
                "unsupported source samples: {:?} {} bits",
                source.sample_kind,
                source.bits_per_channel
            );
            return Err(EncoderStatus::FormatNotSupported);
        }
        if (source.sample_rate - destination.sample_rate).abs() > SAMPLE_RATE_TOLERANCE {
            log::warn!(
                "linear PCM encoder does not resample ({} Hz -> {} Hz)",
                source.sample_rate,
                destination.sample_rate
            );
            return Err(EncoderStatus::FormatNotSupported);
        }
        let Some(map) = channel_map(source.channels, destination.channels) else {
            log::warn!(
                "no channel mapping from {} to {} channels",
                source.channels,
                destination.channels
            );
            return Err(EncoderStatus::FormatNotSupported);
        };

        log::debug!(
            "linear PCM encoder: {} Hz, {} -> {} channels ({:?})",
            source.sample_rate,
            source.channels,
            destination.channels,
            map
        );

        Ok(Box::new(PcmHandle {
            source: *source,
            output_channels: destination.channels as usize,
            map,
            pending: Vec::new(),
            frame: Vec::with_capacity(source.channels as usize),
        }))
    }
}

struct PcmHandle {
    source: SourceFormat,
    output_channels: usize,
    map: ChannelMap,
    /// Converted interleaved samples not yet emitted.
    pending: Vec<i16>,
    frame: Vec<i16>,
}

impl PcmHandle {
    fn read_sample(&self, list: &AudioBufferList, frame: usize, channel: usize) -> Option<i16> {
        let width = self.source.bytes_per_sample();
        let (buffer, index) = if self.source.interleaved {
            (0, frame * self.source.channels as usize + channel)
        } else {
            (channel, frame)
        };
        let offset = index * width;
        let bytes = list.buffers().get(buffer)?.data.get(offset..offset + width)?;

        let sample = match (self.source.sample_kind, width) {
            (SampleKind::Float, 4) => {
                let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            }
            (SampleKind::SignedInteger, 2) => i16::from_le_bytes([bytes[0], bytes[1]]),
            (SampleKind::SignedInteger, 4) => {
                (i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) >> 16) as i16
            }
            _ => return None,
        };
        Some(sample)
    }

    /// Convert a delivered buffer list and queue its samples for output.
    fn append(&mut self, list: &AudioBufferList) -> Result<(), EncoderStatus> {
        let channels = self.source.channels as usize;
        self.pending.reserve(list.frame_count() * self.output_channels);

        for frame in 0..list.frame_count() {
            self.frame.clear();
            for channel in 0..channels {
                let sample = self
                    .read_sample(list, frame, channel)
                    .ok_or(EncoderStatus::InvalidInputSize)?;
                self.frame.push(sample);
            }

            match self.map {
                ChannelMap::Direct => self.pending.extend_from_slice(&self.frame),
                ChannelMap::Duplicate => {
                    let sample = self.frame[0];
                    self.pending
                        .extend(std::iter::repeat(sample).take(self.output_channels));
                }
                ChannelMap::Downmix => {
                    let sum: i32 = self.frame.iter().map(|&s| s as i32).sum();
                    self.pending.push((sum / channels as i32) as i16);
                }
            }
        }
        Ok(())
    }
}

impl EncoderHandle for PcmHandle {
    fn fill_one_unit(
        &mut self,
        input: &mut dyn InputDataProc,
        output: &mut PacketBuffer,
    ) -> Result<(), EncoderStatus> {
        let unit = FRAMES_PER_UNIT * self.output_channels;

        while self.pending.len() < unit {
            match input.pull() {
                Ok(delivery) => self.append(&delivery.buffers)?,
                Err(status) if self.pending.is_empty() => return Err(status),
                Err(_) => break,
            }
        }

        let take = self.pending.len().min(unit);
        for sample in self.pending.drain(..take) {
            output.write(&sample.to_le_bytes());
        }
        output.set_frames((take / self.output_channels) as u32);
        Ok(())
    }

    fn set_property(&mut self, property: EncoderProperty, _value: u32) -> Result<(), EncoderStatus> {
        log::debug!("linear PCM encoder ignores {:?}", property);
        Err(EncoderStatus::PropertyNotSupported)
    }

    fn max_packet_size(&self) -> usize {
        FRAMES_PER_UNIT * self.output_channels * OUTPUT_BYTES_PER_SAMPLE
    }
}
