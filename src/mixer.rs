//! The per-tick mixing pipeline.
//!
//! One synchronous pass per simulation tick, stages strictly in order:
//! frame synchronization, emitter lifecycle, pair batching, graph
//! maintenance plus buffer layout, sample rendering, read-back update. Graph
//! mutation is single-threaded and fully submitted before rendering starts.

use crate::batch::{PairBatcher, PairStream};
use crate::buffer::MegaBuffer;
use crate::config::BloomSonicSettings;
use crate::emitter::{Emitter, EmitterLifecycle};
use crate::error::Result;
use crate::events::BloomSonicEvent;
use crate::graph::{ListenerGraphBuilder, NodeId, NodeKind, NodeUpdate, SignalGraph};
use crate::listener::Listener;
use crate::readback::{BufferReader, ReadbackDescriptor};
use crate::render::render_tick;
use crate::sync::{FrameSync, SyncFrame};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// The engine core: owns the pipeline state and the graph collaborator.
///
/// The host drives it with one [`tick`](Self::tick) per simulation update,
/// passing its emitter set, listener set and externally computed weighted
/// pair streams. The packed per-listener output for the tick is available
/// from [`output`](Self::output) afterwards.
pub struct BloomSonicMixer {
    settings: BloomSonicSettings,
    graph: Box<dyn SignalGraph + Send>,
    frame_sync: FrameSync,
    lifecycle: EmitterLifecycle,
    batcher: PairBatcher,
    builder: ListenerGraphBuilder,
    mega: MegaBuffer,
    reader_node: NodeId,
    counter: Arc<AtomicU64>,
    event_tx: Sender<BloomSonicEvent>,
    event_rx: Receiver<BloomSonicEvent>,
    readback_tx: Option<Sender<ReadbackDescriptor>>,
    readback_listener: usize,
}

impl BloomSonicMixer {
    pub fn new(
        settings: BloomSonicSettings,
        mut graph: Box<dyn SignalGraph + Send>,
    ) -> Result<Self> {
        let settings = settings.validated()?;
        let builder = ListenerGraphBuilder::new(graph.as_mut());
        let reader_node = graph.create_node(NodeKind::BufferReader);
        let (event_tx, event_rx) = unbounded();
        log::info!(
            "mixer initialized: {} Hz, {} samples per audio frame, {} frames per update",
            settings.sample_rate,
            settings.samples_per_audio_frame,
            settings.audio_frames_per_update
        );
        Ok(Self {
            settings,
            graph,
            frame_sync: FrameSync::new(),
            lifecycle: EmitterLifecycle::new(),
            batcher: PairBatcher::new(),
            builder,
            mega: MegaBuffer::new(),
            reader_node,
            counter: Arc::new(AtomicU64::new(0)),
            event_tx,
            event_rx,
            readback_tx: None,
            readback_listener: 0,
        })
    }

    pub fn settings(&self) -> &BloomSonicSettings {
        &self.settings
    }

    /// The packed `(buffer_id, frame)` counter shared with the hardware
    /// side. Hosts running their own audio callback store into this.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.counter.clone()
    }

    /// Receiver for engine events (finished one-shots, starvation).
    pub fn events(&self) -> Receiver<BloomSonicEvent> {
        self.event_rx.clone()
    }

    /// Which listener's channels feed the built-in read-back path.
    pub fn set_readback_listener(&mut self, index: usize) {
        self.readback_listener = index;
    }

    /// Create the audio-thread-side buffer reader and attach it to this
    /// mixer's read-back channel.
    pub fn create_reader(&mut self, channels: u16) -> BufferReader {
        let (tx, rx) = unbounded();
        self.readback_tx = Some(tx);
        BufferReader::new(
            rx,
            self.counter.clone(),
            Some(self.event_tx.clone()),
            channels,
            &self.settings,
        )
    }

    /// Run one simulation tick. Returns the tick's synchronization frame.
    pub fn tick(
        &mut self,
        emitters: &mut [Emitter],
        listeners: &[Listener],
        pair_streams: &[PairStream],
    ) -> SyncFrame {
        let sync = self.frame_sync.advance(&self.counter, &self.settings);

        let finished = self.lifecycle.run(emitters, &sync, &self.settings);
        for emitter_id in finished {
            log::debug!("one-shot emitter {} finished", emitter_id);
            let _ = self
                .event_tx
                .send(BloomSonicEvent::OneShotFinished { emitter_id });
        }

        self.batcher.begin_tick();
        for stream in pair_streams {
            self.batcher.merge_stream(emitters, stream);
        }

        self.builder.sync_listeners(self.graph.as_mut(), listeners);
        self.mega
            .layout(listeners, self.settings.samples_per_update());

        render_tick(&mut self.mega, &self.batcher, &sync, &self.settings);

        self.push_readback(listeners, &sync);
        sync
    }

    /// This tick's packed per-listener output buffers.
    pub fn output(&self) -> &MegaBuffer {
        &self.mega
    }

    fn push_readback(&mut self, listeners: &[Listener], sync: &SyncFrame) {
        if self.readback_listener >= listeners.len() {
            return;
        }
        let params = self.mega.params()[self.readback_listener];
        if params.channel_count == 0 {
            return;
        }

        let mut interleaved = vec![0.0f32; params.samples_per_channel * params.channel_count];
        for channel in 0..params.channel_count {
            let source = self.mega.channel(self.readback_listener, channel);
            for (i, &sample) in source.iter().enumerate() {
                interleaved[i * params.channel_count + channel] = sample;
            }
        }

        let descriptor = ReadbackDescriptor {
            channels: params.channel_count as u16,
            start_frame: sync.audio_frame,
            samples: interleaved.into(),
            warn_if_starved: self.settings.log_warning_if_buffers_are_starved,
        };
        self.graph
            .update_node(self.reader_node, NodeUpdate::Readback(descriptor.clone()));
        if let Some(tx) = &self.readback_tx {
            let _ = tx.send(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{PairCandidate, Weights};
    use crate::clip::Clip;
    use crate::graph::NullGraph;
    use crate::listener::mono_profile;

    fn mixer() -> BloomSonicMixer {
        let settings = BloomSonicSettings {
            sample_rate: 44100,
            samples_per_audio_frame: 100,
            audio_frames_per_update: 1,
            lookahead_audio_frames: 0,
            ..Default::default()
        };
        BloomSonicMixer::new(settings, Box::new(NullGraph::new())).unwrap()
    }

    #[test]
    fn test_empty_tick_is_harmless() {
        let mut mixer = mixer();
        let sync = mixer.tick(&mut [], &[], &[]);
        assert_eq!(sync.audio_frame, 1);
        assert!(mixer.output().data().is_empty());
    }

    #[test]
    fn test_finished_one_shot_emits_event() {
        let mut mixer = mixer();
        let clip = Clip::mono(vec![0.0; 100], 44100).unwrap();
        let mut emitters = vec![Emitter::one_shot(9, Some(clip))];
        let listeners = vec![Listener::new(1, mono_profile(), 1)];

        mixer.tick(&mut emitters, &listeners, &[]);
        // Hardware races two frames past the one-frame clip.
        mixer
            .counter()
            .store(crate::sync::pack_counter(1, 4), std::sync::atomic::Ordering::Release);
        mixer.tick(&mut emitters, &listeners, &[]);

        let events = mixer.events();
        assert_eq!(
            events.try_recv().unwrap(),
            BloomSonicEvent::OneShotFinished { emitter_id: 9 }
        );
    }

    #[test]
    fn test_tick_renders_batched_pairs() {
        let mut mixer = mixer();
        let clip = Clip::mono((0..1000).map(|i| i as f32).collect(), 44100).unwrap();
        let mut emitters = vec![Emitter::one_shot(1, Some(clip))];
        let listeners = vec![Listener::new(1, mono_profile(), 1)];
        let stream = vec![PairCandidate {
            listener: 0,
            emitter: 0,
            weights: Weights {
                channel_gains: vec![1.0],
                itd_taps: vec![1.0],
            },
        }];

        // The one-shot is stamped with this tick's synthesis frame, so the
        // first rendered block starts at the top of the clip.
        mixer.tick(&mut emitters, &listeners, &[stream]);
        let out = mixer.output().channel(0, 0);
        for (i, &sample) in out.iter().enumerate() {
            assert_eq!(sample, i as f32);
        }
    }
}
