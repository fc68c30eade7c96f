use crate::models::buffer::{AudioBufferList, PacketBuffer};
use crate::models::error::EncoderStatus;
use crate::models::format::{EncoderProperty, NegotiatedFormat, SourceFormat};
use crate::models::profile::EncoderCandidate;

/// Input handed to the encoder by the pull callback.
#[derive(Debug)]
pub struct InputDelivery {
    pub buffers: AudioBufferList,
    /// Packets of input available; always 1 for a successful pull.
    pub packets: u32,
}

/// Pull callback an encoder invokes when it needs more input.
///
/// Implemented by the session's `BufferAdapter`.
pub trait InputDataProc {
    /// Request input. An `Err` means nothing is available for this call.
    fn pull(&mut self) -> Result<InputDelivery, EncoderStatus>;
}

/// Factory for encoder handles.
///
/// Wraps a platform codec (e.g. an `AudioConverter`) or a software encoder.
pub trait PullEncoder: Send + Sync {
    /// Create a handle converting `source` into `destination`.
    ///
    /// `candidates` lists preferred implementations; empty means the
    /// system default.
    fn create(
        &self,
        source: &SourceFormat,
        destination: &NegotiatedFormat,
        candidates: &[EncoderCandidate],
    ) -> Result<Box<dyn EncoderHandle>, EncoderStatus>;

    /// Whether handles convert between differing sample rates.
    fn resamples(&self) -> bool {
        false
    }
}

/// A live encoder bound to one source/destination pair.
///
/// Dropping the handle disposes its native resources.
pub trait EncoderHandle: Send {
    /// Produce at most one output packet into `output`, pulling input from
    /// `input` as needed.
    fn fill_one_unit(
        &mut self,
        input: &mut dyn InputDataProc,
        output: &mut PacketBuffer,
    ) -> Result<(), EncoderStatus>;

    fn set_property(&mut self, property: EncoderProperty, value: u32) -> Result<(), EncoderStatus>;

    /// Upper bound for one output packet, used to size the output buffer.
    fn max_packet_size(&self) -> usize;
}
