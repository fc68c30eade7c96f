use crate::models::buffer::PresentationTime;
use crate::models::format::NegotiatedFormat;

/// Consumer of a transcoding session's output.
///
/// Callbacks run on the producer's thread (packets) or the control queue
/// (format reset on stop), after the session has released its encoder
/// state, one callback at a time and in production order. A callback may
/// read the session's getters and queue `stop`, `invalidate` or
/// `set_bitrate`, but must not call `encode` or wait on a `ControlTicket`.
pub trait TranscodeDelegate: Send + Sync {
    /// Called when the announced output format changes, including the
    /// transition to `None` on stop.
    fn on_format_changed(&self, format: Option<&NegotiatedFormat>);

    /// Called once per produced packet, in production order.
    fn on_packet(&self, data: &[u8], presentation_time: PresentationTime);
}
