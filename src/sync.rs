//! Frame synchronization between the simulation tick and the hardware
//! callback.
//!
//! The hardware side publishes a packed `(buffer_id, frame)` counter after
//! every buffer it consumes. The simulation side reads it with a single
//! atomic load and derives the synthesis frame for this tick, with lookahead
//! to absorb scheduling jitter. A short history of past decisions keeps a
//! tick from scheduling a frame earlier than one already promised to the
//! hardware thread for the same buffer.

use crate::config::BloomSonicSettings;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pack a `(buffer_id, frame)` pair into one atomic word.
pub const fn pack_counter(buffer_id: u32, frame: u32) -> u64 {
    ((buffer_id as u64) << 32) | frame as u64
}

/// Inverse of [`pack_counter`].
pub const fn unpack_counter(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

/// True if buffer id `a` is newer than `b`, treating ids as a wrapping
/// sequence. Signed half-window comparison over the full `u32` range.
pub(crate) fn buffer_id_newer(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) as i32 > 0
}

/// One past synchronization decision, retained until its buffer id is
/// superseded by the hardware.
#[derive(Debug, Clone, Copy)]
struct AudioFrameHistoryElement {
    buffer_id: u32,
    #[allow(dead_code)]
    audio_frame: u64,
    expected_next_update_frame: u64,
}

/// Result of one synchronization step.
#[derive(Debug, Clone, Copy)]
pub struct SyncFrame {
    /// The synthesis frame this tick renders.
    pub audio_frame: u64,
    /// The hardware's actual current frame.
    pub last_played_audio_frame: u64,
    /// The hardware's current buffer id.
    pub last_read_buffer_id: u32,
}

#[derive(Debug, Default)]
pub struct FrameSync {
    history: VecDeque<AudioFrameHistoryElement>,
}

impl FrameSync {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(8),
        }
    }

    /// Derive this tick's synthesis frame from the hardware counter.
    pub fn advance(&mut self, counter: &AtomicU64, settings: &BloomSonicSettings) -> SyncFrame {
        let (buffer_id, frame32) = unpack_counter(counter.load(Ordering::Acquire));
        let frame = frame32 as u64;

        // Entries for superseded buffers are stale: the hardware already
        // consumed those buffers, so their promises no longer bind us.
        while let Some(front) = self.history.front() {
            if buffer_id_newer(buffer_id, front.buffer_id) {
                self.history.pop_front();
            } else {
                break;
            }
        }

        let default_target = frame + 1 + settings.lookahead();
        let promised = self
            .history
            .iter()
            .find(|e| e.buffer_id == buffer_id)
            .map(|e| e.expected_next_update_frame);
        let audio_frame = match promised {
            Some(expected) => expected.max(default_target),
            None => default_target,
        };

        let element = AudioFrameHistoryElement {
            buffer_id,
            audio_frame,
            expected_next_update_frame: audio_frame + settings.audio_frames_per_update as u64,
        };
        match self.history.back_mut() {
            Some(back) if back.buffer_id == buffer_id => *back = element,
            _ => self.history.push_back(element),
        }

        SyncFrame {
            audio_frame,
            last_played_audio_frame: frame,
            last_read_buffer_id: buffer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(lookahead: i32, frames_per_update: u32) -> BloomSonicSettings {
        BloomSonicSettings {
            lookahead_audio_frames: lookahead,
            audio_frames_per_update: frames_per_update,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_target_with_lookahead() {
        let mut sync = FrameSync::new();
        let counter = AtomicU64::new(pack_counter(0, 10));
        let out = sync.advance(&counter, &settings(3, 1));
        assert_eq!(out.audio_frame, 14);
        assert_eq!(out.last_played_audio_frame, 10);
        assert_eq!(out.last_read_buffer_id, 0);
    }

    #[test]
    fn test_negative_lookahead_clamped() {
        let mut sync = FrameSync::new();
        let counter = AtomicU64::new(pack_counter(0, 10));
        let out = sync.advance(&counter, &settings(-5, 1));
        assert_eq!(out.audio_frame, 11);
    }

    #[test]
    fn test_promise_honored_for_same_buffer() {
        let mut sync = FrameSync::new();
        let counter = AtomicU64::new(pack_counter(4, 10));
        let cfg = settings(0, 4);

        // Two ticks land on the same hardware buffer: the second must pick
        // up where the first left off, not re-schedule frame 11.
        let first = sync.advance(&counter, &cfg);
        assert_eq!(first.audio_frame, 11);
        let second = sync.advance(&counter, &cfg);
        assert_eq!(second.audio_frame, 15);
        let third = sync.advance(&counter, &cfg);
        assert_eq!(third.audio_frame, 19);
    }

    #[test]
    fn test_stale_history_evicted() {
        let mut sync = FrameSync::new();
        let cfg = settings(0, 8);

        let counter = AtomicU64::new(pack_counter(1, 0));
        sync.advance(&counter, &cfg);
        sync.advance(&counter, &cfg);

        // Hardware moves on; the old buffer's promise must not apply.
        counter.store(pack_counter(2, 8), Ordering::Release);
        let out = sync.advance(&counter, &cfg);
        assert_eq!(out.audio_frame, 9);
        assert_eq!(sync.history.len(), 1);
    }

    #[test]
    fn test_frame_monotonic_over_lockstep_input() {
        let mut sync = FrameSync::new();
        let cfg = settings(2, 4);
        let counter = AtomicU64::new(0);

        let mut last = 0u64;
        for step in 0u32..64 {
            // Hardware consumes one 4-frame buffer every other tick.
            let buffer_id = step / 2;
            let frame = buffer_id * 4;
            counter.store(pack_counter(buffer_id, frame), Ordering::Release);
            let out = sync.advance(&counter, &cfg);
            assert!(
                out.audio_frame >= last,
                "audio_frame regressed: {} -> {}",
                last,
                out.audio_frame
            );
            last = out.audio_frame;
        }
    }

    #[test]
    fn test_wraparound_buffer_id_ordering() {
        assert!(buffer_id_newer(1, 0));
        assert!(!buffer_id_newer(0, 1));
        assert!(!buffer_id_newer(7, 7));
        // Across the wrap point, small ids are newer than huge ones.
        assert!(buffer_id_newer(3, u32::MAX - 2));
        assert!(!buffer_id_newer(u32::MAX - 2, 3));
    }

    #[test]
    fn test_wraparound_history_eviction() {
        let mut sync = FrameSync::new();
        let cfg = settings(0, 1);

        let counter = AtomicU64::new(pack_counter(u32::MAX, 100));
        sync.advance(&counter, &cfg);
        assert_eq!(sync.history.len(), 1);

        counter.store(pack_counter(0, 101), Ordering::Release);
        sync.advance(&counter, &cfg);
        assert_eq!(sync.history.len(), 1);
        assert_eq!(sync.history.front().unwrap().buffer_id, 0);
    }
}
