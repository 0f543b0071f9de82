//! BloomSonic: a real-time, multi-listener spatial audio mixing engine.
//!
//! Each simulation tick, the engine batches the contributions of one-shot
//! and looped sound emitters per listener, maintains per-listener ILD
//! subgraphs in an opaque signal-graph backend, renders ITD-spatialized
//! samples into a packed per-tick output buffer, and bridges the simulation
//! tick rate to the hardware callback rate.
//!
//! # Architecture
//!
//! - **Main/simulation thread**: owns the [`BloomSonicMixer`] and drives one
//!   [`tick`](mixer::BloomSonicMixer::tick) per update.
//! - **Audio thread**: a [`BufferReader`](readback::BufferReader) consumes
//!   the packed output at the hardware rate and publishes the playback
//!   counter the frame synchronizer reads; [`engine`] can host it on a cpal
//!   stream.

pub mod batch;
pub mod buffer;
pub mod clip;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod listener;
pub mod math;
pub mod mixer;
pub mod readback;
pub mod render;
pub mod sync;

pub use batch::{BatchedEntry, ClipFrameLookup, PairBatcher, PairCandidate, PairStream, Weights};
pub use buffer::{ListenerBufferParameters, MegaBuffer};
pub use clip::{Clip, ClipId};
pub use config::BloomSonicSettings;
pub use emitter::{Cone, Emitter, EmitterKind, EmitterLifecycle, LoopOffsetMode, TransformParts};
pub use engine::BloomSonicEngine;
pub use error::{BloomSonicError, Result};
pub use events::BloomSonicEvent;
pub use graph::{
    ConnectionId, ListenerGraphBuilder, NodeId, NodeKind, NodeUpdate, NullGraph, PortId,
    SignalGraph,
};
pub use listener::{FilterParams, IldChannel, IldProfile, Listener};
pub use math::{Pose, Quat, Vec3};
pub use mixer::BloomSonicMixer;
pub use readback::{BufferReader, ReadbackDescriptor};
pub use sync::{FrameSync, SyncFrame, pack_counter, unpack_counter};
