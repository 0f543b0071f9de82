//! The audio-thread side of the engine: the buffer-reader node.
//!
//! The mixer pushes one read-back descriptor per tick; the reader stashes
//! the PCM in a ring buffer, fills hardware buffers on demand, and publishes
//! the packed `(buffer_id, frame)` counter the frame synchronizer reads.

use crate::config::BloomSonicSettings;
use crate::events::BloomSonicEvent;
use crate::sync::pack_counter;
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-tick PCM hand-off from the mixer to the buffer-reader node:
/// channel count, the interleaved sample block, the synthesis frame the
/// block starts at, and the starved-warning flag.
#[derive(Debug, Clone)]
pub struct ReadbackDescriptor {
    pub channels: u16,
    pub start_frame: u64,
    pub samples: Arc<[f32]>,
    pub warn_if_starved: bool,
}

pub struct BufferReader {
    descriptors: Receiver<ReadbackDescriptor>,
    counter: Arc<AtomicU64>,
    events: Option<Sender<BloomSonicEvent>>,
    producer: HeapProd<f32>,
    consumer: HeapCons<f32>,
    channels: u16,
    samples_per_frame: u32,
    safety_frames: u64,
    warn_if_starved: bool,
    buffer_id: u32,
    samples_played: u64,
}

impl BufferReader {
    pub fn new(
        descriptors: Receiver<ReadbackDescriptor>,
        counter: Arc<AtomicU64>,
        events: Option<Sender<BloomSonicEvent>>,
        channels: u16,
        settings: &BloomSonicSettings,
    ) -> Self {
        let channels = channels.max(1);
        let capacity = (settings.samples_per_update() * channels as usize * 8).max(4096);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        Self {
            descriptors,
            counter,
            events,
            producer,
            consumer,
            channels,
            samples_per_frame: settings.samples_per_audio_frame,
            safety_frames: settings.safety(),
            warn_if_starved: settings.log_warning_if_buffers_are_starved,
            buffer_id: 0,
            samples_played: 0,
        }
    }

    /// Fill one hardware buffer with interleaved samples, then publish the
    /// advanced `(buffer_id, frame)` counter. Returns the frames actually
    /// sourced from produced audio; the remainder is silence.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        self.pull_descriptors();

        let popped = self.consumer.pop_slice(out);
        out[popped..].fill(0.0);

        if popped < out.len() {
            let missing = out.len() - popped;
            if self.warn_if_starved {
                log::warn!("audio read-back starved, missing {} samples", missing);
            }
            if let Some(events) = &self.events {
                let _ = events.send(BloomSonicEvent::BufferStarved {
                    missing_samples: missing,
                });
            }
        } else {
            let slack = self.buffered_frames();
            if slack < self.safety_frames {
                log::debug!(
                    "read-back slack low: {} audio frames buffered, safety is {}",
                    slack,
                    self.safety_frames
                );
            }
        }

        let channels = self.channels as usize;
        self.samples_played += (out.len() / channels) as u64;
        let frame = (self.samples_played / self.samples_per_frame as u64) as u32;
        self.buffer_id = self.buffer_id.wrapping_add(1);
        self.counter
            .store(pack_counter(self.buffer_id, frame), Ordering::Release);

        popped / channels
    }

    /// Audio frames of produced-but-unplayed slack in the ring.
    pub fn buffered_frames(&self) -> u64 {
        let per_frame = self.channels as usize * self.samples_per_frame as usize;
        (self.consumer.occupied_len() / per_frame.max(1)) as u64
    }

    fn pull_descriptors(&mut self) {
        while self.producer.vacant_len() > 0 {
            let Ok(descriptor) = self.descriptors.try_recv() else {
                break;
            };
            self.channels = descriptor.channels.max(1);
            self.warn_if_starved = descriptor.warn_if_starved;
            let pushed = self.producer.push_slice(&descriptor.samples);
            if pushed < descriptor.samples.len() {
                log::debug!(
                    "read-back ring full, dropped {} samples",
                    descriptor.samples.len() - pushed
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::unpack_counter;
    use crossbeam_channel::unbounded;

    fn settings() -> BloomSonicSettings {
        BloomSonicSettings {
            sample_rate: 48000,
            samples_per_audio_frame: 4,
            audio_frames_per_update: 1,
            ..Default::default()
        }
    }

    fn descriptor(samples: Vec<f32>) -> ReadbackDescriptor {
        ReadbackDescriptor {
            channels: 2,
            start_frame: 0,
            samples: samples.into(),
            warn_if_starved: false,
        }
    }

    #[test]
    fn test_fill_drains_descriptors() {
        let (tx, rx) = unbounded();
        let counter = Arc::new(AtomicU64::new(0));
        let mut reader = BufferReader::new(rx, counter.clone(), None, 2, &settings());

        tx.send(descriptor(vec![0.1; 8])).unwrap();
        let mut out = vec![0.0f32; 8];
        let frames = reader.fill(&mut out);
        assert_eq!(frames, 4);
        assert!(out.iter().all(|&s| s == 0.1));

        let (buffer_id, frame) = unpack_counter(counter.load(Ordering::Acquire));
        assert_eq!(buffer_id, 1);
        assert_eq!(frame, 1);
    }

    #[test]
    fn test_starvation_pads_silence_and_reports() {
        let (_tx, rx) = unbounded::<ReadbackDescriptor>();
        let (event_tx, event_rx) = unbounded();
        let counter = Arc::new(AtomicU64::new(0));
        let mut reader = BufferReader::new(rx, counter, Some(event_tx), 2, &settings());

        let mut out = vec![1.0f32; 8];
        let frames = reader.fill(&mut out);
        assert_eq!(frames, 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(
            event_rx.try_recv().unwrap(),
            BloomSonicEvent::BufferStarved { missing_samples: 8 }
        );
    }

    #[test]
    fn test_counter_advances_per_fill() {
        let (tx, rx) = unbounded();
        let counter = Arc::new(AtomicU64::new(0));
        let mut reader = BufferReader::new(rx, counter.clone(), None, 2, &settings());

        for _ in 0..3 {
            tx.send(descriptor(vec![0.0; 8])).unwrap();
        }
        let mut out = vec![0.0f32; 8];
        reader.fill(&mut out);
        reader.fill(&mut out);
        reader.fill(&mut out);

        let (buffer_id, frame) = unpack_counter(counter.load(Ordering::Acquire));
        assert_eq!(buffer_id, 3);
        assert_eq!(frame, 3);
    }
}
