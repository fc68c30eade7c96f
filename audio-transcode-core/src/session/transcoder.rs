use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::buffer::{AudioBufferList, PacketBuffer, PresentationTime, SampleBuffer};
use crate::models::diagnostics::TranscodeDiagnostics;
use crate::models::error::{EncoderStatus, TranscodeError};
use crate::models::format::{NegotiatedFormat, SourceFormat};
use crate::models::profile::DestinationProfile;
use crate::models::settings::TranscodeSettings;
use crate::models::state::{DrainEnd, EncodeOutcome, TranscodeState};
use crate::processing::bitrate;
use crate::processing::buffer_adapter::BufferAdapter;
use crate::processing::format_model;
use crate::session::control::{ControlCommand, ControlQueue, ControlTicket};
use crate::session::dispatch::{DelegateCall, Dispatcher};
use crate::traits::delegate::TranscodeDelegate;
use crate::traits::encoder::{EncoderHandle, PullEncoder};

/// Sample rates closer than this are considered equal.
const SAMPLE_RATE_TOLERANCE: f64 = 0.01;

/// Everything the encode path and the control queue both touch.
#[derive(Default)]
struct EncoderState {
    source: Option<SourceFormat>,
    negotiated: Option<NegotiatedFormat>,
    /// Last format reported to the delegate.
    announced: Option<NegotiatedFormat>,
    encoder: Option<Box<dyn EncoderHandle>>,
    adapter: BufferAdapter,
}

/// State shared between the session handle and its control queue.
///
/// Lock order: `encoder_state`, then `settings`, then `diagnostics`.
/// `delegate` is only read-cloned and never held across another lock.
/// Delegate callbacks run through `dispatcher` after `encoder_state` is
/// released.
struct SessionCore {
    id: Uuid,
    factory: Box<dyn PullEncoder>,
    delegate: RwLock<Option<Arc<dyn TranscodeDelegate>>>,
    dispatcher: Dispatcher,
    running: AtomicBool,
    /// Bumped by every `stop()`; a `Start` queued before it is stale.
    stop_generation: AtomicU64,
    actual_bitrate: AtomicU32,
    settings: Mutex<TranscodeSettings>,
    encoder_state: Mutex<EncoderState>,
    diagnostics: Mutex<TranscodeDiagnostics>,
}

impl SessionCore {
    fn delegate(&self) -> Option<Arc<dyn TranscodeDelegate>> {
        self.delegate.read().clone()
    }

    fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Start(generation) => {
                if generation != self.stop_generation.load(Ordering::SeqCst) {
                    log::debug!("[{}] start superseded by a later stop", self.id);
                    return;
                }
                self.running.store(true, Ordering::SeqCst);
                self.diagnostics.lock().started_at = Some(chrono::Utc::now());
                log::info!("[{}] transcoding started", self.id);
            }
            ControlCommand::Stop => {
                let batch = {
                    let mut state = self.encoder_state.lock();
                    self.dispose(&mut state);
                    state.adapter.clear();
                    self.running.store(false, Ordering::SeqCst);
                    let mut calls = Vec::new();
                    self.announce(&mut state, None, &mut calls);
                    self.dispatcher.seal(calls)
                };
                self.dispatcher.deliver(batch, self.delegate());
                log::info!("[{}] transcoding stopped", self.id);
            }
            ControlCommand::Invalidate => {
                let mut state = self.encoder_state.lock();
                self.dispose(&mut state);
                log::info!("[{}] formats invalidated", self.id);
            }
            ControlCommand::SetBitrate(requested) => {
                let mut state = self.encoder_state.lock();
                let EncoderState {
                    encoder, negotiated, ..
                } = &mut *state;
                if let (Some(encoder), Some(format)) = (encoder.as_mut(), negotiated.as_ref()) {
                    self.negotiate_bitrate(encoder.as_mut(), requested, format.channels);
                }
            }
            ControlCommand::Barrier => {}
        }
    }

    /// Drop the encoder and forget both formats. The announced format survives.
    fn dispose(&self, state: &mut EncoderState) {
        if state.encoder.take().is_some() {
            log::debug!("[{}] encoder disposed", self.id);
        }
        state.negotiated = None;
        state.source = None;
    }

    /// Queue a format report if `format` differs from the last announcement.
    fn announce(
        &self,
        state: &mut EncoderState,
        format: Option<NegotiatedFormat>,
        calls: &mut Vec<DelegateCall>,
    ) {
        if state.announced == format {
            return;
        }
        state.announced = format;
        self.diagnostics.lock().format_changes += 1;
        calls.push(DelegateCall::Format(format));
    }

    fn negotiate_bitrate(&self, encoder: &mut dyn EncoderHandle, requested: u32, channels: u32) -> u32 {
        let result = bitrate::negotiate(encoder, requested, channels);
        self.actual_bitrate.store(result.actual, Ordering::SeqCst);
        self.diagnostics.lock().bitrate_attempts += result.attempts.len() as u64;
        if !result.accepted {
            log::warn!(
                "[{}] encoder rejected every bitrate down from {}, pinned to {}",
                self.id,
                requested,
                result.actual
            );
        }
        result.actual
    }

    /// Derive and cache the destination format if none is cached yet.
    ///
    /// Requires a captured source format. Announces the format on success.
    fn ensure_negotiated_format(
        &self,
        state: &mut EncoderState,
        settings: &TranscodeSettings,
        calls: &mut Vec<DelegateCall>,
    ) -> Result<NegotiatedFormat, TranscodeError> {
        if let Some(format) = state.negotiated {
            return Ok(format);
        }

        let source = state.source.ok_or(TranscodeError::MissingSourceFormat)?;
        let format = format_model::derive(
            &source,
            settings.profile,
            settings.sample_rate_override,
            settings.channel_override,
        );

        if (format.sample_rate - source.sample_rate).abs() > SAMPLE_RATE_TOLERANCE
            && !self.factory.resamples()
        {
            return Err(TranscodeError::UnsupportedResample {
                source_rate: source.sample_rate,
                target_rate: format.sample_rate,
            });
        }

        log::info!(
            "[{}] negotiated {:?} {} Hz x {} channels",
            self.id,
            format.format_id,
            format.sample_rate,
            format.channels
        );
        state.negotiated = Some(format);
        self.announce(state, Some(format), calls);
        Ok(format)
    }

    /// Return the live encoder, creating it (and negotiating its bitrate) on first use.
    fn ensure_encoder<'a>(
        &self,
        slot: &'a mut Option<Box<dyn EncoderHandle>>,
        source: &SourceFormat,
        destination: &NegotiatedFormat,
        settings: &TranscodeSettings,
    ) -> Result<&'a mut dyn EncoderHandle, TranscodeError> {
        let encoder = match slot.take() {
            Some(encoder) => encoder,
            None => {
                let mut encoder = self
                    .factory
                    .create(source, destination, settings.profile.candidates())
                    .map_err(TranscodeError::EncoderUnavailable)?;
                self.diagnostics.lock().encoders_created += 1;
                self.negotiate_bitrate(encoder.as_mut(), settings.bitrate, destination.channels);
                encoder
            }
        };
        Ok(slot.insert(encoder).as_mut())
    }

    fn encode(&self, buffer: &SampleBuffer) -> EncodeOutcome {
        self.diagnostics.lock().encode_calls += 1;

        if !self.running.load(Ordering::SeqCst) {
            self.diagnostics.lock().skipped_calls += 1;
            return EncodeOutcome::Skipped;
        }

        let (outcome, batch) = {
            let mut state = self.encoder_state.lock();
            // A stop may have been applied while we waited for the lock.
            if !self.running.load(Ordering::SeqCst) {
                self.diagnostics.lock().skipped_calls += 1;
                return EncodeOutcome::Skipped;
            }

            let mut calls = Vec::new();
            let outcome = match self.encode_locked(&mut state, buffer, &mut calls) {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.record_abort(&error);
                    EncodeOutcome::Aborted(error)
                }
            };
            (outcome, self.dispatcher.seal(calls))
        };

        self.dispatcher.deliver(batch, self.delegate());
        outcome
    }

    fn encode_locked(
        &self,
        state: &mut EncoderState,
        buffer: &SampleBuffer,
        calls: &mut Vec<DelegateCall>,
    ) -> Result<EncodeOutcome, TranscodeError> {
        let format = *buffer.format().ok_or_else(|| {
            TranscodeError::MalformedInput("sample buffer has no format description".into())
        })?;

        match state.source {
            None => {
                log::info!(
                    "[{}] source format: {} Hz x {} channels, {} bits, {}",
                    self.id,
                    format.sample_rate,
                    format.channels,
                    format.bits_per_channel,
                    if format.interleaved { "interleaved" } else { "planar" }
                );
                state.source = Some(format);
            }
            Some(source) if source != format => return Err(TranscodeError::SourceFormatChanged),
            Some(_) => {}
        }

        let settings = *self.settings.lock();

        let block = buffer
            .block()
            .ok_or_else(|| TranscodeError::MalformedInput("sample buffer has no block buffer".into()))?;
        let mut input = AudioBufferList::extract(block, &format)?;
        if settings.muted {
            input.silence();
        }

        let destination = self.ensure_negotiated_format(state, &settings, calls)?;
        let EncoderState { encoder, adapter, .. } = state;
        let encoder = self.ensure_encoder(encoder, &format, &destination, &settings)?;

        adapter.install(input);
        let (packets, end) = self.drain(encoder, adapter, buffer.presentation_time(), calls);
        adapter.clear();

        Ok(EncodeOutcome::Drained { packets, end })
    }

    /// Pull packets out of the encoder until it stops producing them.
    fn drain(
        &self,
        encoder: &mut dyn EncoderHandle,
        adapter: &mut BufferAdapter,
        presentation_time: PresentationTime,
        calls: &mut Vec<DelegateCall>,
    ) -> (usize, DrainEnd) {
        let mut packets = 0usize;
        let mut bytes = 0u64;

        let end = loop {
            let mut output = PacketBuffer::with_capacity(encoder.max_packet_size());
            match encoder.fill_one_unit(&mut *adapter, &mut output) {
                Ok(()) => {
                    packets += 1;
                    bytes += output.len() as u64;
                    calls.push(DelegateCall::Packet(output.into_bytes(), presentation_time));
                }
                Err(EncoderStatus::InvalidInputSize) => break DrainEnd::SizeMismatch,
                Err(status) => break DrainEnd::Status(status),
            }
        };

        match end {
            DrainEnd::SizeMismatch => {
                log::warn!("[{}] encoder reported invalid input size, ending packets", self.id)
            }
            end if end.is_fatal() => log::warn!("[{}] encoder stopped: {:?}", self.id, end),
            _ => {}
        }

        let mut diagnostics = self.diagnostics.lock();
        diagnostics.packets_emitted += packets as u64;
        diagnostics.bytes_emitted += bytes;
        match end {
            DrainEnd::SizeMismatch => diagnostics.size_mismatch_endings += 1,
            end if end.is_fatal() => diagnostics.fatal_endings += 1,
            _ => {}
        }

        (packets, end)
    }

    fn record_abort(&self, error: &TranscodeError) {
        let mut diagnostics = self.diagnostics.lock();
        match error {
            TranscodeError::MalformedInput(reason) => {
                diagnostics.malformed_buffers += 1;
                log::warn!("[{}] dropping sample buffer: {}", self.id, reason);
            }
            TranscodeError::SourceFormatChanged => {
                diagnostics.rejected_buffers += 1;
                log::warn!(
                    "[{}] sample buffer format differs from the captured source; invalidate to switch",
                    self.id
                );
            }
            other => log::error!("[{}] encode failed: {}", self.id, other),
        }
    }
}

/// An adaptive audio transcoding session.
///
/// `encode` runs on the producer's thread. Lifecycle changes and bitrate
/// renegotiation run on a dedicated control queue and return a
/// [`ControlTicket`]:
/// ```text
/// [Producer] → encode() → [FormatModel] → [EncoderHandle ⇄ BufferAdapter] → [Delegate]
///                                ↑
/// [Control queue] start / stop / invalidate / set_bitrate
/// ```
pub struct TranscodeSession {
    core: Arc<SessionCore>,
    control: ControlQueue,
}

impl TranscodeSession {
    pub fn new(encoder: impl PullEncoder + 'static) -> Result<Self, TranscodeError> {
        Self::with_settings(encoder, TranscodeSettings::default())
    }

    pub fn with_settings(
        encoder: impl PullEncoder + 'static,
        settings: TranscodeSettings,
    ) -> Result<Self, TranscodeError> {
        settings.validate()?;

        let core = Arc::new(SessionCore {
            id: Uuid::new_v4(),
            factory: Box::new(encoder),
            delegate: RwLock::new(None),
            dispatcher: Dispatcher::default(),
            running: AtomicBool::new(false),
            stop_generation: AtomicU64::new(0),
            actual_bitrate: AtomicU32::new(settings.bitrate),
            settings: Mutex::new(settings),
            encoder_state: Mutex::new(EncoderState::default()),
            diagnostics: Mutex::new(TranscodeDiagnostics::default()),
        });

        let queue_core = Arc::clone(&core);
        let control = ControlQueue::spawn("transcode-control".into(), move |command| {
            queue_core.apply(command)
        })?;

        Ok(Self { core, control })
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TranscodeDelegate>) {
        *self.core.delegate.write() = Some(delegate);
    }

    pub fn state(&self) -> TranscodeState {
        if self.core.running.load(Ordering::SeqCst) {
            TranscodeState::Running
        } else {
            TranscodeState::Idle
        }
    }

    pub fn settings(&self) -> TranscodeSettings {
        *self.core.settings.lock()
    }

    /// Bitrate in effect after the last negotiation.
    pub fn actual_bitrate(&self) -> u32 {
        self.core.actual_bitrate.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> TranscodeDiagnostics {
        self.core.diagnostics.lock().clone()
    }

    /// Source format captured since the last start or invalidation.
    ///
    /// Waits for an in-flight `encode` to finish.
    pub fn source_format(&self) -> Option<SourceFormat> {
        self.core.encoder_state.lock().source
    }

    /// Destination format currently cached, if any.
    pub fn negotiated_format(&self) -> Option<NegotiatedFormat> {
        self.core.encoder_state.lock().negotiated
    }

    /// Begin accepting sample buffers. The encoder is created lazily.
    pub fn start(&self) -> ControlTicket {
        let generation = self.core.stop_generation.load(Ordering::SeqCst);
        self.control.submit(ControlCommand::Start(generation))
    }

    /// Stop, dispose the encoder and reset every cached format.
    ///
    /// `encode` calls made after this returns are ignored even before the
    /// queue gets to the disposal. A `start` still queued from before this
    /// call is dropped.
    pub fn stop(&self) -> ControlTicket {
        self.core.stop_generation.fetch_add(1, Ordering::SeqCst);
        self.core.running.store(false, Ordering::SeqCst);
        self.control.submit(ControlCommand::Stop)
    }

    /// Dispose the encoder and forget the source and destination formats so
    /// the next buffer renegotiates from scratch. Running state is unchanged.
    pub fn invalidate(&self) -> ControlTicket {
        self.control.submit(ControlCommand::Invalidate)
    }

    /// Request a new per-channel bitrate.
    ///
    /// Renegotiates on the control queue when an encoder exists; otherwise
    /// the value is used when the encoder is created. A zero bitrate is
    /// refused.
    pub fn set_bitrate(&self, bitrate: u32) -> Result<ControlTicket, TranscodeError> {
        self.update_settings(|s| s.bitrate = bitrate)?;
        Ok(self.control.submit(ControlCommand::SetBitrate(bitrate)))
    }

    /// Takes effect on the next `encode` call.
    pub fn set_muted(&self, muted: bool) {
        self.core.settings.lock().muted = muted;
    }

    /// Takes effect at the next format negotiation (after `invalidate`).
    pub fn set_sample_rate_override(&self, sample_rate: f64) -> Result<(), TranscodeError> {
        self.update_settings(|s| s.sample_rate_override = sample_rate)
    }

    /// Takes effect at the next format negotiation (after `invalidate`).
    pub fn set_channel_override(&self, channels: u32) -> Result<(), TranscodeError> {
        self.update_settings(|s| s.channel_override = channels)
    }

    /// Takes effect at the next format negotiation (after `invalidate`).
    pub fn set_profile(&self, profile: DestinationProfile) {
        self.core.settings.lock().profile = profile;
    }

    /// Replace every setting at once. A changed bitrate is renegotiated.
    pub fn apply_settings(&self, settings: TranscodeSettings) -> Result<ControlTicket, TranscodeError> {
        settings.validate()?;
        let previous = std::mem::replace(&mut *self.core.settings.lock(), settings);
        if previous.bitrate != settings.bitrate {
            Ok(self.control.submit(ControlCommand::SetBitrate(settings.bitrate)))
        } else {
            Ok(self.control.submit(ControlCommand::Barrier))
        }
    }

    /// Block until every control command queued so far has been applied.
    ///
    /// Must not be called from a delegate callback.
    pub fn flush(&self) -> Result<(), TranscodeError> {
        self.control.submit(ControlCommand::Barrier).wait()
    }

    /// Push one sample buffer through the encoder. No-op unless running.
    ///
    /// Packets reach the delegate before this returns.
    pub fn encode(&self, buffer: &SampleBuffer) -> EncodeOutcome {
        self.core.encode(buffer)
    }

    fn update_settings(&self, update: impl FnOnce(&mut TranscodeSettings)) -> Result<(), TranscodeError> {
        let mut settings = self.core.settings.lock();
        let mut candidate = *settings;
        update(&mut candidate);
        candidate.validate()?;
        *settings = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Weak};
    use std::time::Duration;

    use crate::models::format::FormatId;
    use crate::models::profile::Codec;
    use crate::models::settings::DEFAULT_BITRATE;
    use crate::testing::{DelegateEvent, MockConfig, MockEncoder, RecordingDelegate};

    /// Reads the session back from inside every callback.
    #[derive(Default)]
    struct ReentrantDelegate {
        session: Mutex<Weak<TranscodeSession>>,
        seen: Mutex<Vec<Option<NegotiatedFormat>>>,
    }

    impl ReentrantDelegate {
        fn observe(&self) {
            let session = self.session.lock().upgrade();
            if let Some(session) = session {
                let format = session.negotiated_format();
                let _ = session.source_format();
                let _ = session.diagnostics();
                self.seen.lock().push(format);
            }
        }
    }

    impl TranscodeDelegate for ReentrantDelegate {
        fn on_format_changed(&self, _format: Option<&NegotiatedFormat>) {
            self.observe();
        }

        fn on_packet(&self, _data: &[u8], _presentation_time: PresentationTime) {
            self.observe();
        }
    }

    fn session_with(config: MockConfig, settings: TranscodeSettings) -> (TranscodeSession, MockEncoder, Arc<RecordingDelegate>) {
        let encoder = MockEncoder::new(config);
        let session = TranscodeSession::with_settings(encoder.clone(), settings).unwrap();
        let delegate = Arc::new(RecordingDelegate::default());
        session.set_delegate(delegate.clone());
        (session, encoder, delegate)
    }

    fn started(config: MockConfig) -> (TranscodeSession, MockEncoder, Arc<RecordingDelegate>) {
        let (session, encoder, delegate) = session_with(config, TranscodeSettings::default());
        session.start().wait().unwrap();
        (session, encoder, delegate)
    }

    fn stereo_buffer(pts: i64) -> SampleBuffer {
        let samples: Vec<i16> = (0..2048).map(|i| (i % 200) as i16 - 100).collect();
        SampleBuffer::from_i16(
            SourceFormat::int16(44100.0, 2),
            PresentationTime::new(pts, 44100),
            &samples,
        )
    }

    #[test]
    fn encode_before_start_is_skipped() {
        let (session, encoder, delegate) = session_with(MockConfig::default(), TranscodeSettings::default());

        assert_eq!(session.encode(&stereo_buffer(0)), EncodeOutcome::Skipped);
        assert!(delegate.events().is_empty());
        assert!(encoder.created().is_empty());
        assert_eq!(session.state(), TranscodeState::Idle);
    }

    #[test]
    fn start_is_lazy() {
        let (session, encoder, _) = started(MockConfig::default());

        assert_eq!(session.state(), TranscodeState::Running);
        assert!(encoder.created().is_empty());
        assert!(session.negotiated_format().is_none());
    }

    #[test]
    fn first_buffer_negotiates_and_emits_packets() {
        let (session, encoder, delegate) = started(MockConfig {
            packets_per_input: 2,
            ..Default::default()
        });

        let outcome = session.encode(&stereo_buffer(4410));

        assert_eq!(
            outcome,
            EncodeOutcome::Drained {
                packets: 2,
                end: DrainEnd::Status(EncoderStatus::InputExhausted)
            }
        );

        let events = delegate.events();
        assert_eq!(events.len(), 3);
        let DelegateEvent::Format(Some(format)) = &events[0] else {
            panic!("expected a format announcement first, got {:?}", events[0]);
        };
        assert_eq!(format.channels, 2);
        assert_eq!(format.frames_per_packet, 1024);
        assert_eq!(format.format_id, FormatId::Mpeg4Aac);

        for (_, pts) in delegate.packets() {
            assert_eq!(pts, PresentationTime::new(4410, 44100));
        }

        let created = encoder.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].2, 2); // AAC candidate list
        assert_eq!(session.actual_bitrate(), 32768);
        assert_eq!(encoder.bitrate_requests(), vec![65536]);
    }

    #[test]
    fn unchanged_format_is_announced_once() {
        let (session, encoder, delegate) = started(MockConfig::default());

        for i in 0..5 {
            session.encode(&stereo_buffer(i * 1024));
        }

        assert_eq!(delegate.formats().len(), 1);
        assert_eq!(delegate.packets().len(), 5);
        assert_eq!(encoder.created().len(), 1);
        assert_eq!(session.diagnostics().format_changes, 1);
    }

    #[test]
    fn pending_input_is_consumed_once_per_call() {
        let (session, encoder, _) = started(MockConfig::default());

        session.encode(&stereo_buffer(0));
        session.encode(&stereo_buffer(1024));

        // One delivery and one exhausted pull per call.
        assert_eq!(encoder.deliveries().len(), 2);
        assert_eq!(encoder.pulls(), 4);
    }

    #[test]
    fn muted_input_reaches_encoder_as_silence() {
        let (session, encoder, delegate) = started(MockConfig::default());

        let loud = session.encode(&stereo_buffer(0));
        session.set_muted(true);
        let quiet = session.encode(&stereo_buffer(1024));

        let deliveries = encoder.deliveries();
        assert!(!deliveries[0].is_silent());
        assert!(deliveries[1].is_silent());
        assert_eq!(deliveries[0].byte_len(), deliveries[1].byte_len());

        // Same packet count, same format, timestamps untouched.
        assert_eq!(loud.packets(), quiet.packets());
        assert_eq!(delegate.formats().len(), 1);
        let packets = delegate.packets();
        assert_eq!(packets[1].1, PresentationTime::new(1024, 44100));
    }

    #[test]
    fn invalid_input_size_ends_draining_quietly() {
        let (session, _, delegate) = started(MockConfig {
            packets_per_input: 3,
            end_status: Some(EncoderStatus::InvalidInputSize),
            ..Default::default()
        });

        let outcome = session.encode(&stereo_buffer(0));

        assert_eq!(
            outcome,
            EncodeOutcome::Drained {
                packets: 3,
                end: DrainEnd::SizeMismatch
            }
        );
        assert_eq!(delegate.packets().len(), 3);
        assert_eq!(session.diagnostics().size_mismatch_endings, 1);
        assert_eq!(session.diagnostics().fatal_endings, 0);
    }

    #[test]
    fn fatal_status_ends_call_but_session_survives() {
        let (session, encoder, _) = started(MockConfig {
            end_status: Some(EncoderStatus::Other(-50)),
            ..Default::default()
        });

        let first = session.encode(&stereo_buffer(0));
        let second = session.encode(&stereo_buffer(1024));

        assert_eq!(
            first,
            EncodeOutcome::Drained {
                packets: 1,
                end: DrainEnd::Status(EncoderStatus::Other(-50))
            }
        );
        assert_eq!(second.packets(), 1);
        assert_eq!(encoder.created().len(), 1);
        assert_eq!(session.diagnostics().fatal_endings, 2);
    }

    #[test]
    fn missing_block_buffer_is_malformed() {
        let (session, encoder, delegate) = started(MockConfig::default());

        let outcome = session.encode(&SampleBuffer::without_block(
            SourceFormat::int16(44100.0, 2),
            PresentationTime::new(0, 44100),
        ));

        assert!(matches!(
            outcome,
            EncodeOutcome::Aborted(TranscodeError::MalformedInput(_))
        ));
        assert!(delegate.packets().is_empty());
        assert!(encoder.created().is_empty());
        assert_eq!(session.diagnostics().malformed_buffers, 1);

        // The session is still usable.
        assert_eq!(session.encode(&stereo_buffer(0)).packets(), 1);
    }

    #[test]
    fn missing_format_description_is_malformed() {
        let (session, _, _) = started(MockConfig::default());

        let outcome = session.encode(&SampleBuffer::without_format(
            PresentationTime::new(0, 44100),
            vec![0; 8],
        ));

        assert!(matches!(
            outcome,
            EncodeOutcome::Aborted(TranscodeError::MalformedInput(_))
        ));
        assert!(session.source_format().is_none());
    }

    #[test]
    fn changed_source_format_is_rejected_until_invalidated() {
        let (session, encoder, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        let mono = SampleBuffer::from_i16(
            SourceFormat::int16(44100.0, 1),
            PresentationTime::new(1024, 44100),
            &[1; 1024],
        );
        assert_eq!(
            session.encode(&mono),
            EncodeOutcome::Aborted(TranscodeError::SourceFormatChanged)
        );
        assert_eq!(session.diagnostics().rejected_buffers, 1);

        session.invalidate().wait().unwrap();
        assert_eq!(session.encode(&mono).packets(), 1);

        let formats = delegate.formats();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[1].map(|f| f.channels), Some(1));
        assert_eq!(encoder.created().len(), 2);
        assert_eq!(encoder.disposed(), 1);
    }

    #[test]
    fn invalidate_with_identical_format_announces_nothing() {
        let (session, encoder, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        session.invalidate().wait().unwrap();
        assert!(session.source_format().is_none());
        assert!(session.negotiated_format().is_none());
        assert_eq!(session.state(), TranscodeState::Running);

        session.encode(&stereo_buffer(1024));

        assert_eq!(delegate.formats().len(), 1);
        assert_eq!(encoder.created().len(), 2);
        assert!(session.negotiated_format().is_some());
    }

    #[test]
    fn stop_then_encode_emits_nothing() {
        let (session, encoder, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));
        let packets_before = delegate.packets().len();

        let ticket = session.stop();
        assert_eq!(session.encode(&stereo_buffer(1024)), EncodeOutcome::Skipped);
        ticket.wait().unwrap();

        assert_eq!(delegate.packets().len(), packets_before);
        assert_eq!(session.state(), TranscodeState::Idle);
        assert_eq!(encoder.disposed(), 1);
        assert_eq!(delegate.formats().last(), Some(&None));
    }

    #[test]
    fn stop_on_idle_session_is_harmless() {
        let (session, _, delegate) = session_with(MockConfig::default(), TranscodeSettings::default());

        session.stop().wait().unwrap();

        assert_eq!(session.encode(&stereo_buffer(0)), EncodeOutcome::Skipped);
        assert_eq!(session.state(), TranscodeState::Idle);
        assert!(delegate.events().is_empty());
    }

    #[test]
    fn restart_after_stop_announces_again() {
        let (session, _, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));
        session.stop().wait().unwrap();
        session.start().wait().unwrap();
        session.encode(&stereo_buffer(0));

        let formats = delegate.formats();
        assert_eq!(formats.len(), 3);
        assert!(formats[1].is_none());
        assert_eq!(formats[0], formats[2]);
    }

    #[test]
    fn bitrate_change_renegotiates_live_encoder() {
        let (session, encoder, _) = started(MockConfig {
            max_bitrate: Some(16384),
            ..Default::default()
        });
        session.set_channel_override(1).unwrap();
        session.encode(&stereo_buffer(0));
        assert_eq!(session.actual_bitrate(), 16384);

        session.set_bitrate(32768).unwrap().wait().unwrap();

        assert_eq!(session.actual_bitrate(), 16384);
        assert_eq!(
            encoder.bitrate_requests(),
            vec![32768, 24576, 16384, 32768, 24576, 16384]
        );
        assert_eq!(session.settings().bitrate, 32768);
    }

    #[test]
    fn bitrate_without_encoder_is_stored_for_later() {
        let (session, encoder, _) = started(MockConfig::default());

        session.set_bitrate(16384).unwrap().wait().unwrap();
        assert!(encoder.bitrate_requests().is_empty());

        session.encode(&stereo_buffer(0));
        assert_eq!(encoder.bitrate_requests(), vec![32768]);
        assert_eq!(session.actual_bitrate(), 16384);
    }

    #[test]
    fn raw_profile_passes_empty_candidate_list() {
        let settings = TranscodeSettings {
            profile: DestinationProfile::Raw,
            ..Default::default()
        };
        let (session, encoder, delegate) = session_with(MockConfig::default(), settings);
        session.start().wait().unwrap();
        session.encode(&stereo_buffer(0));

        let created = encoder.created();
        assert_eq!(created[0].2, 0);
        let format = delegate.formats()[0].unwrap();
        assert_eq!(format.bytes_per_frame, 4);
        assert_eq!(format.format_id, FormatId::LinearPcm);
    }

    #[test]
    fn resample_override_is_rejected_without_resampling_encoder() {
        let (session, encoder, delegate) = started(MockConfig::default());
        session.set_sample_rate_override(48000.0).unwrap();

        let outcome = session.encode(&stereo_buffer(0));

        assert!(matches!(
            outcome,
            EncodeOutcome::Aborted(TranscodeError::UnsupportedResample { .. })
        ));
        assert!(encoder.created().is_empty());
        assert!(delegate.events().is_empty());
    }

    #[test]
    fn resample_override_allowed_for_resampling_encoder() {
        let (session, _, delegate) = started(MockConfig {
            resamples: true,
            ..Default::default()
        });
        session.set_sample_rate_override(48000.0).unwrap();

        assert_eq!(session.encode(&stereo_buffer(0)).packets(), 1);
        assert_eq!(delegate.formats()[0].map(|f| f.sample_rate), Some(48000.0));
    }

    #[test]
    fn encoder_creation_failure_aborts_call() {
        let (session, _, delegate) = started(MockConfig {
            create_error: Some(EncoderStatus::FormatNotSupported),
            ..Default::default()
        });

        let outcome = session.encode(&stereo_buffer(0));

        assert_eq!(
            outcome,
            EncodeOutcome::Aborted(TranscodeError::EncoderUnavailable(
                EncoderStatus::FormatNotSupported
            ))
        );
        assert!(delegate.packets().is_empty());
    }

    #[test]
    fn overrides_wait_for_invalidation() {
        let (session, _, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        session.set_channel_override(1).unwrap();
        session.encode(&stereo_buffer(1024));
        assert_eq!(delegate.formats().len(), 1);

        session.invalidate().wait().unwrap();
        session.encode(&stereo_buffer(2048));
        let formats = delegate.formats();
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[1].map(|f| f.channels), Some(1));
    }

    #[test]
    fn invalid_overrides_are_refused() {
        let (session, _, _) = started(MockConfig::default());
        assert!(session.set_channel_override(32).is_err());
        assert!(session.set_sample_rate_override(f64::NAN).is_err());
        assert_eq!(session.settings(), TranscodeSettings::default());
    }

    #[test]
    fn apply_settings_switches_profile_after_invalidate() {
        let (session, encoder, delegate) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        let settings = TranscodeSettings {
            profile: DestinationProfile::Encoded(Codec::HeAac),
            bitrate: 16384,
            ..Default::default()
        };
        session.apply_settings(settings).unwrap().wait().unwrap();
        assert_eq!(session.actual_bitrate(), 16384);

        session.invalidate().wait().unwrap();
        session.encode(&stereo_buffer(1024));

        let formats = delegate.formats();
        assert_eq!(formats[1].map(|f| f.frames_per_packet), Some(2048));
        assert_eq!(encoder.created()[1].1.format_id, FormatId::Mpeg4AacHe);
    }

    #[test]
    fn concurrent_invalidate_never_breaks_encode() {
        let (session, _, delegate) = started(MockConfig::default());
        let session = Arc::new(session);

        let producer = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                let mut packets = 0;
                for i in 0..200 {
                    packets += session.encode(&stereo_buffer(i * 1024)).packets();
                }
                packets
            })
        };
        for _ in 0..50 {
            session.invalidate();
            session.set_bitrate(24576).unwrap();
        }
        let packets = producer.join().unwrap();
        session.flush().unwrap();

        assert_eq!(packets, 200);
        assert_eq!(delegate.packets().len(), 200);
        assert_eq!(delegate.formats().len(), 1);
    }

    #[test]
    fn delegate_can_query_session_from_callbacks() {
        let session = Arc::new(TranscodeSession::new(MockEncoder::new(MockConfig::default())).unwrap());
        let delegate = Arc::new(ReentrantDelegate::default());
        *delegate.session.lock() = Arc::downgrade(&session);
        session.set_delegate(delegate.clone());
        session.start().wait().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                let packets = session.encode(&stereo_buffer(0)).packets();
                session.stop().wait().unwrap();
                let _ = done_tx.send(packets);
            })
        };
        let packets = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("callbacks re-entering the session never returned");
        producer.join().unwrap();

        assert_eq!(packets, 1);
        let seen = delegate.seen.lock().clone();
        // Announcement, packet, then the reset on stop.
        assert_eq!(seen.len(), 3);
        assert!(seen[0].is_some());
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[2], None);
    }

    #[test]
    fn zero_bitrate_is_refused() {
        let (session, encoder, _) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        assert!(matches!(
            session.set_bitrate(0),
            Err(TranscodeError::InvalidSettings(_))
        ));
        session.flush().unwrap();

        assert_eq!(session.settings().bitrate, DEFAULT_BITRATE);
        assert_eq!(session.actual_bitrate(), DEFAULT_BITRATE);
        assert_eq!(encoder.bitrate_requests(), vec![DEFAULT_BITRATE * 2]);
        let json = session.settings().to_json().unwrap();
        assert!(TranscodeSettings::from_json(&json).is_ok());
    }

    #[test]
    fn start_queued_before_stop_is_dropped() {
        let (session, _, _) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));

        let first_stop = session.stop();
        let restart = session.start();
        let second_stop = session.stop();

        restart.wait().unwrap();
        assert_eq!(session.state(), TranscodeState::Idle);
        assert_eq!(session.encode(&stereo_buffer(1024)), EncodeOutcome::Skipped);

        first_stop.wait().unwrap();
        second_stop.wait().unwrap();
        session.start().wait().unwrap();
        assert_eq!(session.state(), TranscodeState::Running);
        assert_eq!(session.encode(&stereo_buffer(2048)).packets(), 1);
    }

    #[test]
    fn diagnostics_track_calls() {
        let (session, _, _) = started(MockConfig::default());
        session.encode(&stereo_buffer(0));
        session.stop().wait().unwrap();
        session.encode(&stereo_buffer(0));

        let diagnostics = session.diagnostics();
        assert_eq!(diagnostics.encode_calls, 2);
        assert_eq!(diagnostics.skipped_calls, 1);
        assert_eq!(diagnostics.packets_emitted, 1);
        assert_eq!(diagnostics.bytes_emitted, 8);
        assert_eq!(diagnostics.encoders_created, 1);
        assert!(diagnostics.started_at.is_some());
    }
}
