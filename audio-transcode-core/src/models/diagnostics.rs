use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for debugging transcoding sessions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscodeDiagnostics {
    pub encode_calls: u64,
    /// Calls made while the session was not running.
    pub skipped_calls: u64,
    pub malformed_buffers: u64,
    /// Buffers refused because their format no longer matched the source.
    pub rejected_buffers: u64,
    pub packets_emitted: u64,
    pub bytes_emitted: u64,
    pub size_mismatch_endings: u64,
    pub fatal_endings: u64,
    pub encoders_created: u64,
    pub bitrate_attempts: u64,
    pub format_changes: u64,
    pub started_at: Option<DateTime<Utc>>,
}
