//! Scriptable encoder and delegate for exercising the session without a codec.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::buffer::{AudioBufferList, PacketBuffer, PresentationTime};
use crate::models::error::EncoderStatus;
use crate::models::format::{EncoderProperty, NegotiatedFormat, SourceFormat};
use crate::models::profile::EncoderCandidate;
use crate::traits::delegate::TranscodeDelegate;
use crate::traits::encoder::{EncoderHandle, InputDataProc, PullEncoder};

pub(crate) const MOCK_PACKET_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub(crate) struct MockConfig {
    /// Scaled bitrates above this are rejected. `None` accepts everything.
    pub max_bitrate: Option<u32>,
    /// Packets produced from each delivered input.
    pub packets_per_input: usize,
    /// Returned instead of the adapter's status once input runs out.
    pub end_status: Option<EncoderStatus>,
    pub create_error: Option<EncoderStatus>,
    pub resamples: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            max_bitrate: None,
            packets_per_input: 1,
            end_status: None,
            create_error: None,
            resamples: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub bitrate_requests: Vec<u32>,
    pub deliveries: Vec<AudioBufferList>,
    pub created: Vec<(SourceFormat, NegotiatedFormat, usize)>,
    pub disposed: usize,
    pub pulls: usize,
}

#[derive(Clone)]
pub(crate) struct MockEncoder {
    config: MockConfig,
    log: Arc<Mutex<MockLog>>,
}

impl MockEncoder {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    pub fn handle(&self) -> Box<dyn EncoderHandle> {
        Box::new(MockHandle {
            config: self.config.clone(),
            log: Arc::clone(&self.log),
            queued: VecDeque::new(),
            emitted: 0,
        })
    }

    pub fn bitrate_requests(&self) -> Vec<u32> {
        self.log.lock().bitrate_requests.clone()
    }

    pub fn deliveries(&self) -> Vec<AudioBufferList> {
        self.log.lock().deliveries.clone()
    }

    pub fn created(&self) -> Vec<(SourceFormat, NegotiatedFormat, usize)> {
        self.log.lock().created.clone()
    }

    pub fn disposed(&self) -> usize {
        self.log.lock().disposed
    }

    pub fn pulls(&self) -> usize {
        self.log.lock().pulls
    }
}

impl PullEncoder for MockEncoder {
    fn create(
        &self,
        source: &SourceFormat,
        destination: &NegotiatedFormat,
        candidates: &[EncoderCandidate],
    ) -> Result<Box<dyn EncoderHandle>, EncoderStatus> {
        if let Some(status) = self.config.create_error {
            return Err(status);
        }
        self.log
            .lock()
            .created
            .push((*source, *destination, candidates.len()));
        Ok(self.handle())
    }

    fn resamples(&self) -> bool {
        self.config.resamples
    }
}

struct MockHandle {
    config: MockConfig,
    log: Arc<Mutex<MockLog>>,
    queued: VecDeque<Vec<u8>>,
    emitted: u8,
}

impl EncoderHandle for MockHandle {
    fn fill_one_unit(
        &mut self,
        input: &mut dyn InputDataProc,
        output: &mut PacketBuffer,
    ) -> Result<(), EncoderStatus> {
        if self.queued.is_empty() {
            self.log.lock().pulls += 1;
            match input.pull() {
                Ok(delivery) => {
                    self.log.lock().deliveries.push(delivery.buffers);
                    for _ in 0..self.config.packets_per_input {
                        self.emitted = self.emitted.wrapping_add(1);
                        self.queued.push_back(vec![self.emitted; MOCK_PACKET_SIZE]);
                    }
                }
                Err(status) => return Err(self.config.end_status.unwrap_or(status)),
            }
        }

        match self.queued.pop_front() {
            Some(packet) => {
                output.write(&packet);
                Ok(())
            }
            None => Err(self.config.end_status.unwrap_or(EncoderStatus::InputExhausted)),
        }
    }

    fn set_property(&mut self, property: EncoderProperty, value: u32) -> Result<(), EncoderStatus> {
        match property {
            EncoderProperty::EncodeBitRate => {
                self.log.lock().bitrate_requests.push(value);
                match self.config.max_bitrate {
                    Some(max) if value > max => Err(EncoderStatus::Other(-50)),
                    _ => Ok(()),
                }
            }
        }
    }

    fn max_packet_size(&self) -> usize {
        MOCK_PACKET_SIZE
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.log.lock().disposed += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DelegateEvent {
    Format(Option<NegotiatedFormat>),
    Packet(Vec<u8>, PresentationTime),
}

/// Delegate recording every callback in order.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    events: Mutex<Vec<DelegateEvent>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub fn formats(&self) -> Vec<Option<NegotiatedFormat>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DelegateEvent::Format(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn packets(&self) -> Vec<(Vec<u8>, PresentationTime)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DelegateEvent::Packet(data, pts) => Some((data, pts)),
                _ => None,
            })
            .collect()
    }
}

impl TranscodeDelegate for RecordingDelegate {
    fn on_format_changed(&self, format: Option<&NegotiatedFormat>) {
        self.events.lock().push(DelegateEvent::Format(format.copied()));
    }

    fn on_packet(&self, data: &[u8], presentation_time: PresentationTime) {
        self.events
            .lock()
            .push(DelegateEvent::Packet(data.to_vec(), presentation_time));
    }
}
