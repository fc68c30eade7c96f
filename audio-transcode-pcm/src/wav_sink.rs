//! `TranscodeDelegate` that writes raw PCM packets into a WAV file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use audio_transcode_core::{FormatId, NegotiatedFormat, PresentationTime, TranscodeDelegate};
use parking_lot::Mutex;
use thiserror::Error;

use crate::wav_format::WavHeader;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("wav sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav sink cannot store {0:?}")]
    UnsupportedFormat(FormatId),
}

#[derive(Default)]
struct SinkState {
    file: Option<BufWriter<File>>,
    format: Option<NegotiatedFormat>,
    data_bytes: u64,
    first_time: Option<PresentationTime>,
}

/// Writes the raw profile's packets to `path`.
///
/// The file is created on the first linear-PCM format announcement. Sizes in
/// the header are patched when the session announces `None` or on `finish`.
/// A different format announced while the file is open is ignored. An
/// announcement after the file was finished recreates it.
pub struct WavPacketSink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl WavPacketSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Mutex::new(SinkState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample data bytes written so far.
    pub fn data_bytes(&self) -> u64 {
        self.state.lock().data_bytes
    }

    /// Timestamp of the first packet written.
    pub fn first_presentation_time(&self) -> Option<PresentationTime> {
        self.state.lock().first_time
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    fn open(&self, state: &mut SinkState, format: &NegotiatedFormat) -> Result<(), SinkError> {
        let header =
            WavHeader::for_format(format).ok_or(SinkError::UnsupportedFormat(format.format_id))?;

        let mut file = BufWriter::new(File::create(&self.path)?);
        file.write_all(&header.to_bytes(0))?;

        state.file = Some(file);
        state.format = Some(*format);
        state.data_bytes = 0;
        state.first_time = None;
        log::info!(
            "wav sink opened {}: {} Hz, {} channels",
            self.path.display(),
            format.sample_rate,
            format.channels
        );
        Ok(())
    }

    /// Patch header sizes and close the file. Safe to call more than once.
    pub fn finish(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let Some(mut file) = state.file.take() else {
            return Ok(());
        };
        file.flush()?;
        let mut file = file.into_inner().map_err(|e| SinkError::Io(e.into_error()))?;

        WavHeader::finalize(&mut file, state.data_bytes)?;

        log::info!(
            "wav sink closed {} ({} data bytes)",
            self.path.display(),
            state.data_bytes
        );
        Ok(())
    }
}

impl TranscodeDelegate for WavPacketSink {
    fn on_format_changed(&self, format: Option<&NegotiatedFormat>) {
        let Some(format) = format else {
            if let Err(e) = self.finish() {
                log::error!("wav sink failed to finalize {}: {}", self.path.display(), e);
            }
            return;
        };

        let mut state = self.state.lock();
        if state.file.is_some() {
            if state.format.as_ref() != Some(format) {
                log::warn!("wav sink ignoring format change while {} is open", self.path.display());
            }
            return;
        }

        match self.open(&mut state, format) {
            Ok(()) => {}
            Err(SinkError::UnsupportedFormat(id)) => log::warn!("wav sink ignoring non-PCM format {:?}", id),
            Err(e) => log::error!("wav sink failed to open {}: {}", self.path.display(), e),
        }
    }

    fn on_packet(&self, data: &[u8], presentation_time: PresentationTime) {
        let mut state = self.state.lock();
        let Some(file) = state.file.as_mut() else {
            log::trace!("wav sink dropping {} bytes, no file open", data.len());
            return;
        };
        if let Err(e) = file.write_all(data) {
            log::error!("wav sink write failed: {}", e);
            return;
        }
        state.data_bytes += data.len() as u64;
        state.first_time.get_or_insert(presentation_time);
    }
}

impl Drop for WavPacketSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("wav sink failed to finalize on drop: {}", e);
        }
    }
}
