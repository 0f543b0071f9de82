//! The per-tick output "mega-buffer".
//!
//! Every listener's per-channel samples for one tick are packed into a
//! single contiguous allocation. The layout is a prefix sum over the
//! listener set, computed fresh every tick and cleared before the renderer
//! accumulates into it.

use crate::listener::Listener;

/// Layout entry for one listener's slice of the mega-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerBufferParameters {
    /// Offset of the listener's first sample in the mega-buffer.
    pub buffer_start: usize,
    pub left_channel_count: usize,
    pub channel_count: usize,
    pub samples_per_channel: usize,
}

/// One render work item: a single (listener, channel) pair.
#[derive(Debug, Clone, Copy)]
pub struct RenderItem {
    pub listener: usize,
    pub channel: usize,
    pub left_channel_count: usize,
}

#[derive(Debug, Default)]
pub struct MegaBuffer {
    data: Vec<f32>,
    params: Vec<ListenerBufferParameters>,
}

impl MegaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute this tick's layout and size the buffer exactly for it. All
    /// samples start at zero; rendering only ever accumulates.
    pub fn layout(&mut self, listeners: &[Listener], samples_per_channel: usize) {
        self.params.clear();
        let mut offset = 0usize;
        for listener in listeners {
            let channel_count = listener.profile.channel_count();
            self.params.push(ListenerBufferParameters {
                buffer_start: offset,
                left_channel_count: listener.profile.left_count(),
                channel_count,
                samples_per_channel,
            });
            offset += channel_count * samples_per_channel;
        }
        self.data.clear();
        self.data.resize(offset, 0.0);
    }

    pub fn params(&self) -> &[ListenerBufferParameters] {
        &self.params
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Samples of one listener channel.
    pub fn channel(&self, listener: usize, channel: usize) -> &[f32] {
        let p = &self.params[listener];
        debug_assert!(channel < p.channel_count);
        let start = p.buffer_start + channel * p.samples_per_channel;
        &self.data[start..start + p.samples_per_channel]
    }

    /// Split the buffer into disjoint per-(listener, channel) slices, in
    /// layout order. Disjointness is what lets the renderer run work items
    /// in parallel without locks.
    pub fn channel_slices_mut(&mut self) -> Vec<(RenderItem, &mut [f32])> {
        let mut items = Vec::new();
        let mut rest = self.data.as_mut_slice();
        for (listener, p) in self.params.iter().enumerate() {
            for channel in 0..p.channel_count {
                let (head, tail) = rest.split_at_mut(p.samples_per_channel);
                rest = tail;
                items.push((
                    RenderItem {
                        listener,
                        channel,
                        left_channel_count: p.left_channel_count,
                    },
                    head,
                ));
            }
        }
        items
    }
}
