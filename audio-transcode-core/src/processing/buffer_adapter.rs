use crate::models::buffer::AudioBufferList;
use crate::models::error::EncoderStatus;
use crate::traits::encoder::{InputDataProc, InputDelivery};

/// Holds the input for the current encode call and hands it to the encoder
/// exactly once.
///
/// The first pull after `install` returns the buffer list with one packet of
/// input; every later pull reports `InputExhausted`, which ends the caller's
/// draining loop.
#[derive(Debug, Default)]
pub struct BufferAdapter {
    pending: Option<AudioBufferList>,
}

impl BufferAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the input for the next draining loop, replacing any leftover.
    pub fn install(&mut self, buffers: AudioBufferList) {
        self.pending = Some(buffers);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

impl InputDataProc for BufferAdapter {
    fn pull(&mut self) -> Result<InputDelivery, EncoderStatus> {
        match self.pending.take() {
            Some(buffers) => Ok(InputDelivery { buffers, packets: 1 }),
            None => Err(EncoderStatus::InputExhausted),
        }
    }
}
