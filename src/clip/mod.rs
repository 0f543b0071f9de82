mod resampler;

use crate::error::{BloomSonicError, Result};
use std::sync::Arc;
use uuid::Uuid;

pub use resampler::ClipResampler;

/// Identity of a clip asset. Part of the batching key, so it must stay cheap
/// to hash and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Immutable audio asset: planar mono or stereo sample arrays at a native
/// sample rate, plus an optional table of valid loop offsets.
///
/// Decoding and import belong to the host's asset system; the engine only
/// ever holds clips by `Arc` reference.
#[derive(Debug)]
pub struct Clip {
    id: ClipId,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    loop_offsets: Vec<u64>,
}

impl Clip {
    pub fn new(
        channels: Vec<Vec<f32>>,
        sample_rate: u32,
        loop_offsets: Vec<u64>,
    ) -> Result<Arc<Self>> {
        if sample_rate == 0 {
            return Err(BloomSonicError::Clip(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if channels.is_empty() || channels.len() > 2 {
            return Err(BloomSonicError::Clip(format!(
                "clips must be mono or stereo, got {} channels",
                channels.len()
            )));
        }
        if channels.len() == 2 && channels[0].len() != channels[1].len() {
            return Err(BloomSonicError::Clip(format!(
                "channel lengths differ: {} vs {}",
                channels[0].len(),
                channels[1].len()
            )));
        }
        let len = channels[0].len() as u64;
        if let Some(&bad) = loop_offsets.iter().find(|&&o| o >= len.max(1)) {
            return Err(BloomSonicError::Clip(format!(
                "loop offset {} out of range for clip of {} samples",
                bad, len
            )));
        }
        Ok(Arc::new(Self {
            id: ClipId::new(),
            channels,
            sample_rate,
            loop_offsets,
        }))
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Arc<Self>> {
        Self::new(vec![samples], sample_rate, Vec::new())
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Arc<Self>> {
        Self::new(vec![left, right], sample_rate, Vec::new())
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Clip length in samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels[0].is_empty()
    }

    /// Samples for one side of the clip. Mono clips feed both sides.
    pub fn samples(&self, side: usize) -> &[f32] {
        &self.channels[side.min(self.channels.len() - 1)]
    }

    /// Precomputed valid loop start offsets, in samples. Empty means "any".
    pub fn loop_offsets(&self) -> &[u64] {
        &self.loop_offsets
    }

    /// Rate-convert the whole clip, returning a new asset with a fresh id.
    ///
    /// Hosts can pre-match clip rates to the output rate so playback takes
    /// the cheaper matched-rate render path. Loop offsets are rescaled to the
    /// new rate.
    pub fn resampled(&self, target_sample_rate: u32) -> Result<Arc<Self>> {
        if target_sample_rate == self.sample_rate {
            return Self::new(
                self.channels.clone(),
                self.sample_rate,
                self.loop_offsets.clone(),
            );
        }

        let resampler = ClipResampler::new(self.sample_rate, target_sample_rate, None)?;
        let channels = self
            .channels
            .iter()
            .map(|ch| resampler.resample_channel(ch))
            .collect::<Result<Vec<_>>>()?;

        let ratio = target_sample_rate as f64 / self.sample_rate as f64;
        let new_len = channels[0].len() as u64;
        let loop_offsets = self
            .loop_offsets
            .iter()
            .map(|&o| ((o as f64 * ratio) as u64).min(new_len.saturating_sub(1)))
            .collect();

        Self::new(channels, target_sample_rate, loop_offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_clip() {
        let clip = Clip::mono(vec![0.1, 0.2, 0.3], 44100).unwrap();
        assert_eq!(clip.len(), 3);
        assert_eq!(clip.channel_count(), 1);
        assert_eq!(clip.samples(0), clip.samples(1));
    }

    #[test]
    fn test_mismatched_stereo_rejected() {
        assert!(Clip::stereo(vec![0.0; 4], vec![0.0; 5], 44100).is_err());
    }

    #[test]
    fn test_loop_offset_out_of_range_rejected() {
        assert!(Clip::new(vec![vec![0.0; 4]], 44100, vec![4]).is_err());
        assert!(Clip::new(vec![vec![0.0; 4]], 44100, vec![3]).is_ok());
    }

    #[test]
    fn test_clip_ids_unique() {
        let a = Clip::mono(vec![0.0], 44100).unwrap();
        let b = Clip::mono(vec![0.0], 44100).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
