use serde::{Deserialize, Serialize};

use super::error::TranscodeError;
use super::profile::DestinationProfile;

/// Bitrate requested before any configuration, per channel.
pub const DEFAULT_BITRATE: u32 = 32 * 1024;

/// Largest channel override accepted.
pub const MAX_CHANNEL_OVERRIDE: u32 = 8;

/// Configuration for a transcoding session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    /// Replace every input sample with silence before encoding.
    pub muted: bool,

    /// Requested bitrate per channel.
    pub bitrate: u32,

    /// Target sample rate; 0 keeps the source rate.
    pub sample_rate_override: f64,

    /// Target channel count; 0 keeps the source channel count.
    pub channel_override: u32,

    pub profile: DestinationProfile,
}

impl TranscodeSettings {
    pub fn validate(&self) -> Result<(), TranscodeError> {
        if !self.sample_rate_override.is_finite() || self.sample_rate_override < 0.0 {
            return Err(TranscodeError::InvalidSettings(format!(
                "sample rate override must be 0 or positive, got {}",
                self.sample_rate_override
            )));
        }
        if self.channel_override > MAX_CHANNEL_OVERRIDE {
            return Err(TranscodeError::InvalidSettings(format!(
                "unsupported channel override: {}",
                self.channel_override
            )));
        }
        if self.bitrate == 0 {
            return Err(TranscodeError::InvalidSettings("bitrate must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, TranscodeError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| TranscodeError::InvalidSettings(format!("failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, TranscodeError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TranscodeError::InvalidSettings(format!("failed to serialize settings: {}", e)))
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            muted: false,
            bitrate: DEFAULT_BITRATE,
            sample_rate_override: 0.0,
            channel_override: 0,
            profile: DestinationProfile::default(),
        }
    }
}
