//! Emitter records and their per-tick lifecycle.
//!
//! The engine does not own emitters; the host simulation creates and
//! destroys them. Each tick the lifecycle pass stamps playback anchors
//! (spawn frames for one-shots, loop offsets for looped emitters), culls
//! finished one-shots, and resolves each emitter's world transform and cone
//! from whichever transform components are present.

use crate::clip::Clip;
use crate::config::BloomSonicSettings;
use crate::math::{Pose, Quat, Vec3};
use crate::sync::{SyncFrame, buffer_id_newer};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;

const LIFECYCLE_CHUNK: usize = 64;

/// Directional cone, in the emitter's local space.
#[derive(Debug, Clone, Copy)]
pub struct Cone {
    pub axis: Vec3,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

/// A cone rotated into world space by the resolved transform.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCone {
    pub direction: Vec3,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

/// How a looped emitter's start offset is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOffsetMode {
    /// Derived from the total samples played at spawn time, so the loop
    /// starts at the top of the clip.
    SpawnRelative,
    /// A uniformly random entry from the clip's valid-loop-offset table.
    FromTable,
}

#[derive(Debug, Clone, Copy)]
pub enum EmitterKind {
    OneShot {
        /// Assigned on first sight; re-stamped if the spawn raced the
        /// hardware thread.
        spawn_frame: Option<u64>,
        spawned_buffer_id: u32,
    },
    Looped {
        mode: LoopOffsetMode,
        /// Offset into the clip, in clip-native samples. Fractional because
        /// rate mismatch makes the ideal start point land between samples.
        offset: Option<f64>,
        locked: bool,
        spawned_buffer_id: u32,
    },
}

/// Transform components present on the host entity. A hierarchical world
/// transform, when present, is authoritative; otherwise the local
/// translation/rotation compose a pose directly. A parent without a world
/// transform is structurally impossible.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformParts {
    pub world: Option<Pose>,
    pub parent: Option<Pose>,
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
}

#[derive(Debug)]
pub struct Emitter {
    pub id: u64,
    pub clip: Option<Arc<Clip>>,
    pub kind: EmitterKind,
    pub transform: TransformParts,
    pub cone: Option<Cone>,
    /// Per-emitter override of [`BloomSonicSettings::use_unscaled_delta_time`].
    pub use_unscaled_delta_time: Option<bool>,
    resolved_pose: Pose,
    resolved_cone: Option<ResolvedCone>,
    finished: bool,
}

impl Emitter {
    pub fn one_shot(id: u64, clip: Option<Arc<Clip>>) -> Self {
        Self {
            id,
            clip,
            kind: EmitterKind::OneShot {
                spawn_frame: None,
                spawned_buffer_id: 0,
            },
            transform: TransformParts::default(),
            cone: None,
            use_unscaled_delta_time: None,
            resolved_pose: Pose::identity(),
            resolved_cone: None,
            finished: false,
        }
    }

    pub fn looped(id: u64, clip: Option<Arc<Clip>>, mode: LoopOffsetMode) -> Self {
        Self {
            id,
            clip,
            kind: EmitterKind::Looped {
                mode,
                offset: None,
                locked: false,
                spawned_buffer_id: 0,
            },
            transform: TransformParts::default(),
            cone: None,
            use_unscaled_delta_time: None,
            resolved_pose: Pose::identity(),
            resolved_cone: None,
            finished: false,
        }
    }

    /// World pose resolved by the last lifecycle pass.
    pub fn pose(&self) -> Pose {
        self.resolved_pose
    }

    /// World-space cone resolved by the last lifecycle pass.
    pub fn resolved_cone(&self) -> Option<&ResolvedCone> {
        self.resolved_cone.as_ref()
    }

    /// True once a one-shot has played past the end of its clip.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// Capability-mask dispatch for transform resolution. The mask is resolved
// once per emitter and indexes a fixed case table instead of branching on
// each component.
const MASK_WORLD: usize = 1 << 0;
const MASK_PARENT: usize = 1 << 1;
const MASK_TRANSLATION: usize = 1 << 2;
const MASK_ROTATION: usize = 1 << 3;
const MASK_CONE: usize = 1 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransformCase {
    Identity,
    IdentityCone,
    Translation,
    TranslationCone,
    Rotation,
    RotationCone,
    TranslationRotation,
    TranslationRotationCone,
    World,
    WorldCone,
    Invalid,
}

use TransformCase::*;

#[rustfmt::skip]
const TRANSFORM_CASES: [TransformCase; 32] = [
    // no cone: mask = world | parent<<1 | translation<<2 | rotation<<3
    Identity,            World, Invalid, World,
    Translation,         World, Invalid, World,
    Rotation,            World, Invalid, World,
    TranslationRotation, World, Invalid, World,
    // cone
    IdentityCone,            WorldCone, Invalid, WorldCone,
    TranslationCone,         WorldCone, Invalid, WorldCone,
    RotationCone,            WorldCone, Invalid, WorldCone,
    TranslationRotationCone, WorldCone, Invalid, WorldCone,
];

fn transform_mask(emitter: &Emitter) -> usize {
    let parts = &emitter.transform;
    (parts.world.is_some() as usize * MASK_WORLD)
        | (parts.parent.is_some() as usize * MASK_PARENT)
        | (parts.translation.is_some() as usize * MASK_TRANSLATION)
        | (parts.rotation.is_some() as usize * MASK_ROTATION)
        | (emitter.cone.is_some() as usize * MASK_CONE)
}

fn pose_local(parts: &TransformParts) -> Pose {
    Pose {
        position: parts.translation.unwrap_or(Vec3::ZERO),
        rotation: parts.rotation.unwrap_or(Quat::IDENTITY),
    }
}

fn pose_world(parts: &TransformParts) -> Pose {
    parts.world.unwrap_or_else(Pose::identity)
}

fn resolve_cone(cone: &Cone, pose: &Pose) -> ResolvedCone {
    ResolvedCone {
        direction: pose.rotate(cone.axis).normalize_or_zero(),
        inner_angle: cone.inner_angle,
        outer_angle: cone.outer_angle,
        outer_gain: cone.outer_gain,
    }
}

pub(crate) fn resolve_transform(emitter: &mut Emitter) {
    let case = TRANSFORM_CASES[transform_mask(emitter)];
    let (pose, with_cone) = match case {
        Identity => (Pose::identity(), false),
        IdentityCone => (Pose::identity(), true),
        Translation | Rotation | TranslationRotation => (pose_local(&emitter.transform), false),
        TranslationCone | RotationCone | TranslationRotationCone => {
            (pose_local(&emitter.transform), true)
        }
        World => (pose_world(&emitter.transform), false),
        WorldCone => (pose_world(&emitter.transform), true),
        Invalid => {
            debug_assert!(
                false,
                "emitter {} has a parent transform but no hierarchical world transform",
                emitter.id
            );
            (Pose::identity(), false)
        }
    };
    emitter.resolved_pose = pose;
    emitter.resolved_cone = if with_cone {
        emitter.cone.as_ref().map(|c| resolve_cone(c, &pose))
    } else {
        None
    };
}

fn stamp_one_shot(emitter: &mut Emitter, sync: &SyncFrame) {
    let EmitterKind::OneShot {
        spawn_frame,
        spawned_buffer_id,
    } = &mut emitter.kind
    else {
        return;
    };

    // A spawn frame computed against a hardware state the audio thread has
    // already moved past would silently skip the first audio frame.
    let missed = match spawn_frame {
        Some(frame) => {
            buffer_id_newer(*spawned_buffer_id, sync.last_read_buffer_id)
                && sync.last_played_audio_frame >= *frame
        }
        None => true,
    };
    if missed {
        *spawn_frame = Some(sync.audio_frame);
        *spawned_buffer_id = sync.last_read_buffer_id;
    }
}

fn cull_one_shot(emitter: &mut Emitter, sync: &SyncFrame, settings: &BloomSonicSettings) {
    let EmitterKind::OneShot {
        spawn_frame: Some(spawn_frame),
        ..
    } = emitter.kind
    else {
        return;
    };
    let Some(clip) = &emitter.clip else {
        return;
    };
    if sync.last_played_audio_frame < spawn_frame {
        return;
    }

    let played_frames = sync.last_played_audio_frame - spawn_frame;
    let stride = clip.sample_rate() as f64 / settings.sample_rate as f64;
    let played_samples = played_frames as f64 * settings.samples_per_audio_frame as f64 * stride;
    if clip.len() as f64 - played_samples < 0.0 {
        emitter.finished = true;
    }
}

/// Offset that would start the clip at sample 0 given the samples already
/// played, in clip-native units.
fn ideal_loop_offset(played_clip_samples: f64, clip_len: f64) -> f64 {
    let phase = played_clip_samples.rem_euclid(clip_len);
    if phase == 0.0 { 0.0 } else { clip_len - phase }
}

/// Forward drift of the ideal start point since `assigned` was computed.
fn drift_since_assignment(assigned: f64, ideal_now: f64, clip_len: f64) -> f64 {
    (assigned - ideal_now).rem_euclid(clip_len)
}

/// Runs the per-tick emitter lifecycle: loop-offset assignment (serial, it
/// owns the RNG), then spawn stamping, culling and transform resolution in
/// parallel chunks.
pub struct EmitterLifecycle {
    rng: SmallRng,
}

impl EmitterLifecycle {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn run(
        &mut self,
        emitters: &mut [Emitter],
        sync: &SyncFrame,
        settings: &BloomSonicSettings,
    ) -> Vec<u64> {
        for emitter in emitters.iter_mut() {
            self.assign_loop_offset(emitter, sync, settings);
        }

        let already_finished: Vec<bool> = emitters.iter().map(|e| e.finished).collect();

        emitters.par_chunks_mut(LIFECYCLE_CHUNK).for_each(|chunk| {
            for emitter in chunk {
                stamp_one_shot(emitter, sync);
                cull_one_shot(emitter, sync, settings);
                resolve_transform(emitter);
            }
        });

        emitters
            .iter()
            .zip(already_finished)
            .filter(|(e, was_finished)| e.finished && !was_finished)
            .map(|(e, _)| e.id)
            .collect()
    }

    fn assign_loop_offset(
        &mut self,
        emitter: &mut Emitter,
        sync: &SyncFrame,
        settings: &BloomSonicSettings,
    ) {
        let Some(clip) = emitter.clip.clone() else {
            return;
        };
        let EmitterKind::Looped {
            mode,
            offset,
            locked,
            spawned_buffer_id,
        } = &mut emitter.kind
        else {
            return;
        };
        if *locked || clip.is_empty() {
            return;
        }

        match mode {
            LoopOffsetMode::FromTable => {
                let table = clip.loop_offsets();
                let picked = if table.is_empty() {
                    0.0
                } else {
                    table[self.rng.gen_range(0..table.len())] as f64
                };
                *offset = Some(picked);
                *spawned_buffer_id = sync.last_read_buffer_id;
                *locked = true;
            }
            LoopOffsetMode::SpawnRelative => {
                let clip_len = clip.len() as f64;
                let stride = clip.sample_rate() as f64 / settings.sample_rate as f64;
                let played_clip_samples = sync.last_played_audio_frame as f64
                    * settings.samples_per_audio_frame as f64
                    * stride;
                let ideal = ideal_loop_offset(played_clip_samples, clip_len);

                match offset {
                    None => {
                        *offset = Some(ideal);
                        *spawned_buffer_id = sync.last_read_buffer_id;
                    }
                    Some(assigned) => {
                        // The anchor was computed against a hardware frame
                        // that may be stale by now; past half a clip of
                        // drift the start point was missed entirely.
                        if drift_since_assignment(*assigned, ideal, clip_len) > clip_len * 0.5 {
                            log::debug!(
                                "looped emitter {} missed its start point, reassigning offset",
                                emitter.id
                            );
                            *assigned = ideal;
                            *spawned_buffer_id = sync.last_read_buffer_id;
                        }
                        if buffer_id_newer(sync.last_read_buffer_id, *spawned_buffer_id) {
                            *locked = true;
                        }
                    }
                }
            }
        }
    }
}

impl Default for EmitterLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
