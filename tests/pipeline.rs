//! End-to-end pipeline tests driving a full mixer over a host-provided
//! signal-graph backend.

use anyhow::Result;
use bloomsonic::{
    BloomSonicEvent, BloomSonicMixer, BloomSonicSettings, Clip, ConnectionId, Emitter, Listener,
    NodeId, NodeKind, NodeUpdate, PairCandidate, PortId, SignalGraph, Weights, pack_counter,
};
use std::sync::atomic::Ordering;

/// Counts structural graph mutations; parameter pushes are not mutations.
#[derive(Default)]
struct CountingGraph {
    mutations: usize,
    next_id: u64,
}

impl SignalGraph for CountingGraph {
    fn create_node(&mut self, _kind: NodeKind) -> NodeId {
        self.mutations += 1;
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn add_inlet(&mut self, _node: NodeId) -> PortId {
        self.mutations += 1;
        self.next_id += 1;
        PortId(self.next_id as u32)
    }

    fn add_outlet(&mut self, _node: NodeId) -> PortId {
        self.mutations += 1;
        self.next_id += 1;
        PortId(self.next_id as u32)
    }

    fn connect(
        &mut self,
        _from_node: NodeId,
        _from_port: PortId,
        _to_node: NodeId,
        _to_port: PortId,
    ) -> ConnectionId {
        self.mutations += 1;
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    fn disconnect(&mut self, _connection: ConnectionId) {
        self.mutations += 1;
    }

    fn set_attenuation(&mut self, _connection: ConnectionId, _gain: f32) {
        self.mutations += 1;
    }

    fn update_node(&mut self, _node: NodeId, _update: NodeUpdate) {}

    fn release_node(&mut self, _node: NodeId) {
        self.mutations += 1;
    }
}

fn scenario_settings() -> BloomSonicSettings {
    BloomSonicSettings {
        sample_rate: 44100,
        samples_per_audio_frame: 441,
        audio_frames_per_update: 1,
        lookahead_audio_frames: 0,
        safety_audio_frames: 0,
        log_warning_if_buffers_are_starved: false,
        use_unscaled_delta_time: false,
    }
}

fn mono_pair_stream(weight: f32) -> Vec<PairCandidate> {
    vec![PairCandidate {
        listener: 0,
        emitter: 0,
        weights: Weights {
            channel_gains: vec![weight],
            itd_taps: vec![1.0],
        },
    }]
}

#[test]
fn one_shot_scenario_renders_second_frame() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut mixer = BloomSonicMixer::new(scenario_settings(), Box::new(CountingGraph::default()))?;
    let clip = Clip::mono((0..4410).map(|i| (i as f32 * 0.01).sin()).collect(), 44100)?;
    let mut emitters = vec![Emitter::one_shot(1, Some(clip.clone()))];
    let listeners = vec![Listener::new(1, bloomsonic::listener::mono_profile(), 1)];

    // Hardware sits at frame 99: this tick synthesizes frame 100 and the
    // one-shot is stamped with it.
    let counter = mixer.counter();
    counter.store(pack_counter(1, 99), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[mono_pair_stream(0.5)]);

    // One audio frame later the playhead has advanced 441 samples.
    counter.store(pack_counter(2, 100), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[mono_pair_stream(0.5)]);

    let out = mixer.output().channel(0, 0);
    assert_eq!(out.len(), 441);
    for (i, &sample) in out.iter().enumerate() {
        let expected = clip.samples(0)[441 + i] * 0.5;
        assert!(
            (sample - expected).abs() < 1e-6,
            "sample {} was {}, expected {}",
            i,
            sample,
            expected
        );
    }
    Ok(())
}

#[test]
fn unchanged_listeners_issue_no_graph_mutations() -> Result<()> {
    let mut mixer = BloomSonicMixer::new(scenario_settings(), Box::new(CountingGraph::default()))?;
    let listeners = vec![
        Listener::new(1, bloomsonic::listener::stereo_profile(), 2),
        Listener::new(2, bloomsonic::listener::mono_profile(), 1),
    ];

    mixer.tick(&mut [], &listeners, &[]);
    // No way to read the box back out, so route the second pass through a
    // listener set that is unchanged and assert via a fresh mixer below.
    mixer.tick(&mut [], &listeners, &[]);

    // Same construction, observed directly on the backend.
    let mut graph = CountingGraph::default();
    let mut builder = bloomsonic::ListenerGraphBuilder::new(&mut graph);
    builder.sync_listeners(&mut graph, &listeners);
    let after_first = graph.mutations;
    builder.sync_listeners(&mut graph, &listeners);
    assert_eq!(graph.mutations, after_first);
    Ok(())
}

#[test]
fn finished_one_shot_is_reported_once() -> Result<()> {
    let mut mixer = BloomSonicMixer::new(scenario_settings(), Box::new(CountingGraph::default()))?;
    let clip = Clip::mono(vec![0.0; 441], 44100)?;
    let mut emitters = vec![Emitter::one_shot(7, Some(clip))];
    let listeners = vec![Listener::new(1, bloomsonic::listener::mono_profile(), 1)];
    let events = mixer.events();

    let counter = mixer.counter();
    counter.store(pack_counter(1, 99), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[]);

    // The clip is one audio frame long; two frames past the spawn the
    // remaining samples go negative.
    counter.store(pack_counter(2, 102), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[]);

    assert_eq!(
        events.try_recv()?,
        BloomSonicEvent::OneShotFinished { emitter_id: 7 }
    );

    counter.store(pack_counter(3, 103), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[]);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn readback_path_carries_rendered_audio() -> Result<()> {
    let mut mixer = BloomSonicMixer::new(scenario_settings(), Box::new(CountingGraph::default()))?;
    let mut reader = mixer.create_reader(1);

    let clip = Clip::mono((0..4410).map(|i| i as f32).collect(), 44100)?;
    let mut emitters = vec![Emitter::one_shot(1, Some(clip.clone()))];
    let listeners = vec![Listener::new(1, bloomsonic::listener::mono_profile(), 1)];

    let counter = mixer.counter();
    counter.store(pack_counter(1, 99), Ordering::Release);
    mixer.tick(&mut emitters, &listeners, &[mono_pair_stream(1.0)]);

    // The first rendered block starts at the top of the clip.
    let mut out = vec![0.0f32; 441];
    let frames = reader.fill(&mut out);
    assert_eq!(frames, 441);
    for (i, &sample) in out.iter().enumerate() {
        assert_eq!(sample, clip.samples(0)[i]);
    }
    Ok(())
}
