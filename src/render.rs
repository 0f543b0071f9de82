//! The sample renderer: walks every batched entry targeting a (listener,
//! channel) work item, resamples clip audio at arbitrary rates, applies ITD
//! taps and accumulates into the mega-buffer.
//!
//! Work items run in parallel; each writes a disjoint mega-buffer slice, so
//! no locking happens inside rendering. All contributions are additive:
//! multiple entries and multiple taps may target the same samples.

use crate::batch::{BatchedEntry, PairBatcher, PlaybackAnchor};
use crate::buffer::{MegaBuffer, RenderItem};
use crate::config::BloomSonicSettings;
use crate::sync::SyncFrame;
use rayon::prelude::*;

/// Maximum interaural time delay, in seconds.
pub const ITD_TIME: f64 = 0.0007;

/// Time offset of one ITD tap, in clip-native samples. Taps sweep from zero
/// to the full delay; the right channel flips the interpolation direction so
/// the two ears mirror each other. A single tap carries no delay at all.
pub fn itd_offset(tap: usize, tap_count: usize, itd_max_offset: f64, is_right: bool) -> f64 {
    if tap_count <= 1 {
        return 0.0;
    }
    let t = tap as f64 / (tap_count - 1) as f64;
    let target = if is_right {
        itd_max_offset
    } else {
        -itd_max_offset
    };
    t * target
}

/// Render one tick's batch into the laid-out mega-buffer.
pub fn render_tick(
    mega: &mut MegaBuffer,
    batch: &PairBatcher,
    sync: &SyncFrame,
    settings: &BloomSonicSettings,
) {
    let entries = batch.entries();
    mega.channel_slices_mut()
        .into_par_iter()
        .for_each(|(item, out)| render_channel(out, item, entries, sync, settings));
}

fn render_channel(
    out: &mut [f32],
    item: RenderItem,
    entries: &[BatchedEntry],
    sync: &SyncFrame,
    settings: &BloomSonicSettings,
) {
    let is_right = item.channel >= item.left_channel_count;
    for entry in entries {
        if entry.listener as usize == item.listener {
            render_entry(out, entry, item.channel, is_right, sync, settings);
        }
    }
}

fn render_entry(
    out: &mut [f32],
    entry: &BatchedEntry,
    channel: usize,
    is_right: bool,
    sync: &SyncFrame,
    settings: &BloomSonicSettings,
) {
    let Some(&channel_weight) = entry.weights.channel_gains.get(channel) else {
        return;
    };
    if channel_weight == 0.0 || entry.clip.is_empty() {
        return;
    }

    let clip = &entry.clip;
    let samples = clip.samples(if is_right { 1 } else { 0 });
    let matched = clip.sample_rate() == settings.sample_rate;
    let stride = clip.sample_rate() as f64 / settings.sample_rate as f64;
    let host_spf = settings.samples_per_audio_frame as f64;
    let itd_max_offset = clip.sample_rate() as f64 * ITD_TIME;

    let taps = &entry.weights.itd_taps;
    let tap_count = taps.len();
    for (tap, &tap_weight) in taps.iter().enumerate() {
        let gain = tap_weight * channel_weight;
        if gain == 0.0 {
            continue;
        }
        let itd = itd_offset(tap, tap_count, itd_max_offset, is_right);

        match entry.lookup.anchor {
            PlaybackAnchor::SpawnFrame(spawn_frame) => {
                let jump_frames = sync.audio_frame as i64 - spawn_frame as i64;
                if matched {
                    let start = jump_frames * settings.samples_per_audio_frame as i64
                        + itd.round() as i64;
                    one_shot_matched(out, samples, start, gain);
                } else {
                    let pos = jump_frames as f64 * host_spf * stride + itd;
                    one_shot_interpolated(out, samples, pos, stride, gain);
                }
            }
            PlaybackAnchor::LoopOffset(bits) => {
                let offset = f64::from_bits(bits);
                if matched {
                    let base = sync.audio_frame as i64 * settings.samples_per_audio_frame as i64
                        + (offset + itd).round() as i64;
                    looped_matched(out, samples, base, gain);
                } else {
                    let pos = sync.audio_frame as f64 * host_spf * stride + offset + itd;
                    looped_interpolated(out, samples, pos, stride, gain);
                }
            }
        }
    }
}

// One-shots never wrap: indices before 0 or past the clip end contribute
// nothing.
fn one_shot_matched(out: &mut [f32], samples: &[f32], start: i64, gain: f32) {
    let len = samples.len() as i64;
    for (i, sample) in out.iter_mut().enumerate() {
        let index = start + i as i64;
        if index >= 0 && index < len {
            *sample += samples[index as usize] * gain;
        }
    }
}

fn one_shot_interpolated(out: &mut [f32], samples: &[f32], pos: f64, stride: f64, gain: f32) {
    let len = samples.len();
    for (i, sample) in out.iter_mut().enumerate() {
        let p = pos + i as f64 * stride;
        if p < 0.0 {
            continue;
        }
        if p >= len as f64 {
            break;
        }
        let base = p.floor();
        let frac = (p - base) as f32;
        let i0 = base as usize;
        let i1 = (i0 + 1).min(len - 1);
        *sample += (samples[i0] * (1.0 - frac) + samples[i1] * frac) * gain;
    }
}

fn looped_matched(out: &mut [f32], samples: &[f32], base: i64, gain: f32) {
    let len = samples.len() as i64;
    for (i, sample) in out.iter_mut().enumerate() {
        let index = (base + i as i64).rem_euclid(len);
        *sample += samples[index as usize] * gain;
    }
}

fn looped_interpolated(out: &mut [f32], samples: &[f32], pos: f64, stride: f64, gain: f32) {
    let len = samples.len();
    let len_f = len as f64;
    for (i, sample) in out.iter_mut().enumerate() {
        let p = (pos + i as f64 * stride).rem_euclid(len_f);
        let base = p.floor();
        let frac = (p - base) as f32;
        let i0 = base as usize % len;
        let i1 = (i0 + 1) % len;
        *sample += (samples[i0] * (1.0 - frac) + samples[i1] * frac) * gain;
    }
}
