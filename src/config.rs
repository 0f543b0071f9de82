use crate::error::{BloomSonicError, Result};

/// Engine-wide settings, validated once at mixer construction.
///
/// `samples_per_audio_frame` is the size of one synthesis quantum (an "audio
/// frame") in PCM samples per channel; it is independent of the hardware
/// device's block size. `audio_frames_per_update` is how many of those quanta
/// one simulation tick synthesizes.
#[derive(Debug, Clone)]
pub struct BloomSonicSettings {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// PCM samples per channel in one audio frame. Must be >= 1.
    pub samples_per_audio_frame: u32,
    /// Audio frames synthesized per simulation tick. Must be >= 1.
    pub audio_frames_per_update: u32,
    /// Buffered slack, in audio frames, below which the read-back side starts
    /// reporting that it is running low. Negative values are clamped to 0.
    pub safety_audio_frames: i32,
    /// Audio frames scheduled ahead of the hardware playback position to
    /// absorb tick jitter. Negative values are clamped to 0.
    pub lookahead_audio_frames: i32,
    /// Emit a warning when the read-back node needs samples that have not
    /// been produced yet.
    pub log_warning_if_buffers_are_starved: bool,
    /// Hint for the host's weight-computation step; listeners and emitters
    /// may override it individually.
    pub use_unscaled_delta_time: bool,
}

impl Default for BloomSonicSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            samples_per_audio_frame: 480,
            audio_frames_per_update: 1,
            safety_audio_frames: 0,
            lookahead_audio_frames: 1,
            log_warning_if_buffers_are_starved: true,
            use_unscaled_delta_time: false,
        }
    }
}

impl BloomSonicSettings {
    pub fn validated(self) -> Result<Self> {
        if self.sample_rate == 0 {
            return Err(BloomSonicError::Configuration(
                "sample_rate must be greater than 0".to_string(),
            ));
        }
        if self.samples_per_audio_frame == 0 {
            return Err(BloomSonicError::Configuration(
                "samples_per_audio_frame must be at least 1".to_string(),
            ));
        }
        if self.audio_frames_per_update == 0 {
            return Err(BloomSonicError::Configuration(
                "audio_frames_per_update must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    /// Lookahead clamped to >= 0, in audio frames.
    pub fn lookahead(&self) -> u64 {
        self.lookahead_audio_frames.max(0) as u64
    }

    /// Safety slack clamped to >= 0, in audio frames.
    pub fn safety(&self) -> u64 {
        self.safety_audio_frames.max(0) as u64
    }

    /// PCM samples per channel synthesized by one tick.
    pub fn samples_per_update(&self) -> usize {
        self.samples_per_audio_frame as usize * self.audio_frames_per_update as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        assert!(BloomSonicSettings::default().validated().is_ok());
    }

    #[test]
    fn test_zero_quantum_rejected() {
        let settings = BloomSonicSettings {
            samples_per_audio_frame: 0,
            ..Default::default()
        };
        assert!(settings.validated().is_err());
    }

    #[test]
    fn test_negative_frames_clamp() {
        let settings = BloomSonicSettings {
            lookahead_audio_frames: -3,
            safety_audio_frames: -1,
            ..Default::default()
        };
        assert_eq!(settings.lookahead(), 0);
        assert_eq!(settings.safety(), 0);
    }
}
