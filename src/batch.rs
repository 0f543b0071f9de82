//! Per-tick batching of (listener, emitter) contribution pairs.
//!
//! Pairs that resolve to the same clip, playback anchor and listener are
//! merged into one entry by summing their weights, so sampling cost scales
//! with the number of unique playback keys rather than listeners × emitters.

use crate::clip::{Clip, ClipId};
use crate::emitter::{Emitter, EmitterKind};
use std::collections::HashMap;
use std::sync::Arc;

const INITIAL_ENTRY_CAPACITY: usize = 256;

/// Per-spatialization-channel gains plus ITD tap gains for one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub channel_gains: Vec<f32>,
    pub itd_taps: Vec<f32>,
}

impl Weights {
    pub fn new(channel_count: usize, tap_count: usize) -> Self {
        Self {
            channel_gains: vec![0.0; channel_count],
            itd_taps: vec![0.0; tap_count],
        }
    }

    /// Componentwise accumulation. Merging is commutative and associative,
    /// so the batch result is independent of pair-stream order.
    pub fn accumulate(&mut self, other: &Weights) {
        debug_assert_eq!(self.channel_gains.len(), other.channel_gains.len());
        debug_assert_eq!(self.itd_taps.len(), other.itd_taps.len());
        for (gain, add) in self.channel_gains.iter_mut().zip(&other.channel_gains) {
            *gain += add;
        }
        for (tap, add) in self.itd_taps.iter_mut().zip(&other.itd_taps) {
            *tap += add;
        }
    }
}

/// The playback anchor half of a batching key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackAnchor {
    SpawnFrame(u64),
    /// Loop offsets are fractional; the bit pattern keeps the key hashable.
    LoopOffset(u64),
}

impl PlaybackAnchor {
    /// The anchor of an emitter whose lifecycle pass has run, if assigned.
    pub fn of(emitter: &Emitter) -> Option<Self> {
        match &emitter.kind {
            EmitterKind::OneShot {
                spawn_frame: Some(frame),
                ..
            } => Some(Self::SpawnFrame(*frame)),
            EmitterKind::Looped {
                offset: Some(offset),
                ..
            } => Some(Self::LoopOffset(offset.to_bits())),
            _ => None,
        }
    }

    pub fn loop_offset(&self) -> Option<f64> {
        match self {
            Self::LoopOffset(bits) => Some(f64::from_bits(*bits)),
            Self::SpawnFrame(_) => None,
        }
    }
}

/// Identity half of a batching key: which clip, played from where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipFrameLookup {
    pub clip: ClipId,
    pub anchor: PlaybackAnchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BatchKey {
    lookup: ClipFrameLookup,
    listener: u32,
}

/// One merged contribution: all pairs sharing a key collapse into this.
#[derive(Debug, Clone)]
pub struct BatchedEntry {
    pub lookup: ClipFrameLookup,
    pub clip: Arc<Clip>,
    pub listener: u32,
    pub looped: bool,
    pub weights: Weights,
}

/// One externally computed candidate pair: listener index, emitter index
/// into this tick's emitter slice, and the pair's spatialization weights.
#[derive(Debug, Clone)]
pub struct PairCandidate {
    pub listener: u32,
    pub emitter: usize,
    pub weights: Weights,
}

/// A stream of candidates filled by one producer; streams are merged
/// serially into the batcher.
pub type PairStream = Vec<PairCandidate>;

#[derive(Debug, Default)]
pub struct PairBatcher {
    entries: Vec<BatchedEntry>,
    index: HashMap<BatchKey, usize>,
}

impl PairBatcher {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(INITIAL_ENTRY_CAPACITY),
            index: HashMap::with_capacity(INITIAL_ENTRY_CAPACITY),
        }
    }

    /// Drop the previous tick's entries, keeping the backing storage.
    pub fn begin_tick(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Merge one candidate pair. Emitters whose clip has not resolved yet
    /// are skipped; that is a legitimate transient state, not an error.
    pub fn merge_pair(&mut self, listener: u32, emitter: &Emitter, weights: &Weights) {
        let Some(clip) = &emitter.clip else {
            return;
        };
        let Some(anchor) = PlaybackAnchor::of(emitter) else {
            return;
        };

        let key = BatchKey {
            lookup: ClipFrameLookup {
                clip: clip.id(),
                anchor,
            },
            listener,
        };
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].weights.accumulate(weights),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(BatchedEntry {
                    lookup: key.lookup,
                    clip: clip.clone(),
                    listener,
                    looped: matches!(emitter.kind, EmitterKind::Looped { .. }),
                    weights: weights.clone(),
                });
            }
        }
    }

    /// Merge a whole candidate stream. The hash-map merge is deliberately
    /// single-threaded; producers fill streams independently.
    pub fn merge_stream(&mut self, emitters: &[Emitter], stream: &PairStream) {
        for candidate in stream {
            let Some(emitter) = emitters.get(candidate.emitter) else {
                continue;
            };
            self.merge_pair(candidate.listener, emitter, &candidate.weights);
        }
    }

    pub fn entries(&self) -> &[BatchedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
