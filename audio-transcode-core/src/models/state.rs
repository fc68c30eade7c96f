use super::error::{EncoderStatus, TranscodeError};

/// Session lifecycle.
///
/// ```text
/// idle → running → idle
///          ↺ invalidate
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeState {
    Idle,
    Running,
}

impl TranscodeState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// How the draining loop of one encode call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// The encoder reported `InvalidInputSize`; tolerated as end of packets.
    SizeMismatch,
    /// Any other non-success status, including the adapter's exhaustion signal.
    Status(EncoderStatus),
}

impl DrainEnd {
    /// Whether the loop ended on something other than running out of input.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SizeMismatch | Self::Status(EncoderStatus::InputExhausted)
        )
    }
}

/// Result of one `encode` call, reported to the producer.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// The session was not running.
    Skipped,
    /// The call was abandoned before draining; no packets were emitted.
    Aborted(TranscodeError),
    Drained { packets: usize, end: DrainEnd },
}

impl EncodeOutcome {
    pub fn packets(&self) -> usize {
        match self {
            Self::Drained { packets, .. } => *packets,
            _ => 0,
        }
    }
}
