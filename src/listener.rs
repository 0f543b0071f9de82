//! Listener records and ILD profiles.

use crate::math::Pose;
use std::sync::Arc;

/// Filter stage parameters. Opaque to the engine; handed to the signal
/// graph when filter nodes are created.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub cutoff_hz: f32,
    pub q: f32,
    pub gain: f32,
}

/// One spatialization channel of an ILD profile.
#[derive(Debug, Clone)]
pub struct IldChannel {
    pub is_right: bool,
    /// Series filter chain, in user order. The signal passes filters in the
    /// listed order before reaching the channel mixer.
    pub filters: Vec<FilterParams>,
    pub filter_volume: f32,
    pub passthrough_volume: f32,
    /// Fraction of the channel's energy that bypasses the filter chain.
    pub passthrough_fraction: f32,
}

impl IldChannel {
    pub fn net_filter_volume(&self) -> f32 {
        self.filter_volume
    }

    pub fn net_passthrough_volume(&self) -> f32 {
        self.passthrough_volume * self.passthrough_fraction
    }
}

/// Per-listener ILD description: left channels listed first, then right.
#[derive(Debug, Clone, Default)]
pub struct IldProfile {
    pub channels: Vec<IldChannel>,
}

impl IldProfile {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn left_count(&self) -> usize {
        self.channels.iter().filter(|c| !c.is_right).count()
    }

    /// Channels with their virtual-channel indices: left channels first,
    /// then right channels offset by the left-channel count.
    pub fn ordered_channels(&self) -> impl Iterator<Item = (u32, &IldChannel)> {
        let left_count = self.left_count() as u32;
        let lefts = self
            .channels
            .iter()
            .filter(|c| !c.is_right)
            .enumerate()
            .map(|(i, c)| (i as u32, c));
        let rights = self
            .channels
            .iter()
            .filter(|c| c.is_right)
            .enumerate()
            .map(move |(i, c)| (left_count + i as u32, c));
        lefts.chain(rights)
    }
}

/// Maximum ITD quantization the engine supports.
pub const MAX_ITD_RESOLUTION: u32 = 15;

#[derive(Debug, Clone)]
pub struct Listener {
    pub id: u64,
    /// Profile identity doubles as the graph dirty key: a new `Arc` means
    /// the listener's subgraph is rebuilt in full.
    pub profile: Arc<IldProfile>,
    /// Quantization of the interaural delay into discrete taps. Clamped to
    /// `[0, 15]`; 0 and 1 both mean "no ITD split".
    pub itd_resolution: u32,
    pub pose: Pose,
    pub use_unscaled_delta_time: Option<bool>,
}

impl Listener {
    pub fn new(id: u64, profile: Arc<IldProfile>, itd_resolution: u32) -> Self {
        Self {
            id,
            profile,
            itd_resolution,
            pose: Pose::identity(),
            use_unscaled_delta_time: None,
        }
    }

    /// Number of ITD taps weight arrays carry for this listener.
    pub fn tap_count(&self) -> usize {
        self.itd_resolution.clamp(0, MAX_ITD_RESOLUTION).max(1) as usize
    }
}

/// A mono profile with a single unfiltered passthrough channel.
pub fn mono_profile() -> Arc<IldProfile> {
    Arc::new(IldProfile {
        channels: vec![IldChannel {
            is_right: false,
            filters: Vec::new(),
            filter_volume: 0.0,
            passthrough_volume: 1.0,
            passthrough_fraction: 1.0,
        }],
    })
}

/// A stereo profile with unfiltered passthrough left and right channels.
pub fn stereo_profile() -> Arc<IldProfile> {
    Arc::new(IldProfile {
        channels: vec![
            IldChannel {
                is_right: false,
                filters: Vec::new(),
                filter_volume: 0.0,
                passthrough_volume: 1.0,
                passthrough_fraction: 1.0,
            },
            IldChannel {
                is_right: true,
                filters: Vec::new(),
                filter_volume: 0.0,
                passthrough_volume: 1.0,
                passthrough_fraction: 1.0,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_channels_order_lefts_first() {
        let profile = IldProfile {
            channels: vec![
                IldChannel {
                    is_right: true,
                    filters: Vec::new(),
                    filter_volume: 1.0,
                    passthrough_volume: 0.0,
                    passthrough_fraction: 0.0,
                },
                IldChannel {
                    is_right: false,
                    filters: Vec::new(),
                    filter_volume: 1.0,
                    passthrough_volume: 0.0,
                    passthrough_fraction: 0.0,
                },
            ],
        };
        let order: Vec<(u32, bool)> = profile
            .ordered_channels()
            .map(|(vc, c)| (vc, c.is_right))
            .collect();
        assert_eq!(order, vec![(0, false), (1, true)]);
    }

    #[test]
    fn test_tap_count_clamped() {
        let listener = Listener::new(1, mono_profile(), 40);
        assert_eq!(listener.tap_count(), 15);
        let listener = Listener::new(1, mono_profile(), 0);
        assert_eq!(listener.tap_count(), 1);
    }
}
