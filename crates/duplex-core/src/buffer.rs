//! Buffer view adapter.
//!
//! Hardware hands over a *buffer list*: one or more buffers, each tagged with
//! the number of interleaved channels it carries and its size in bytes. A
//! planar device presents one single-channel buffer per channel; an
//! interleaved device presents a single buffer carrying every channel.
//!
//! The consumer always sees a flat planar view, [`ChannelBuffers`], with one
//! contiguous `f32` span per channel:
//!
//! ```text
//!  hardware (interleaved)          view (planar)
//!  ┌──┬──┬──┬──┬──┬──┐             ch0 ┌──┬──┬──┐
//!  │L0│R0│L1│R1│L2│R2│  ──gather─▶     │L0│L1│L2│
//!  └──┴──┴──┴──┴──┴──┘             ch1 ├──┼──┼──┤
//!                       ◀─scatter─     │R0│R1│R2│
//!                                      └──┴──┴──┘
//! ```
//!
//! [`gather`] and [`scatter`] never allocate. Channels present on one side but
//! not the other are written as silence.

use std::mem::size_of;

/// One read-only hardware buffer.
#[derive(Debug, Clone, Copy)]
pub struct HardwareBuffer<'a> {
    /// Interleaved channels carried by this buffer.
    pub channels: u16,
    /// Samples, `frames * channels` long.
    pub data: &'a [f32],
}

impl<'a> HardwareBuffer<'a> {
    /// Wrap a slice carrying `channels` interleaved channels.
    pub fn new(channels: u16, data: &'a [f32]) -> Self {
        Self { channels, data }
    }

    /// Number of frames in this buffer.
    pub fn frames(&self) -> usize {
        frames_of(self.data.len(), self.channels)
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * size_of::<f32>()
    }
}

/// One writable hardware buffer.
#[derive(Debug)]
pub struct HardwareBufferMut<'a> {
    /// Interleaved channels carried by this buffer.
    pub channels: u16,
    /// Samples, `frames * channels` long.
    pub data: &'a mut [f32],
}

impl<'a> HardwareBufferMut<'a> {
    /// Wrap a slice carrying `channels` interleaved channels.
    pub fn new(channels: u16, data: &'a mut [f32]) -> Self {
        Self { channels, data }
    }

    /// Number of frames in this buffer.
    pub fn frames(&self) -> usize {
        frames_of(self.data.len(), self.channels)
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * size_of::<f32>()
    }
}

fn frames_of(len: usize, channels: u16) -> usize {
    if channels == 0 {
        0
    } else {
        len / usize::from(channels)
    }
}

/// Frames available in a buffer list: the shortest buffer wins.
pub fn list_frames(list: &[HardwareBuffer<'_>]) -> usize {
    list.iter()
        .filter(|b| b.channels > 0)
        .map(HardwareBuffer::frames)
        .min()
        .unwrap_or(0)
}

/// Frames available in a writable buffer list: the shortest buffer wins.
pub fn list_frames_mut(list: &[HardwareBufferMut<'_>]) -> usize {
    list.iter()
        .filter(|b| b.channels > 0)
        .map(HardwareBufferMut::frames)
        .min()
        .unwrap_or(0)
}

/// Planar per-channel view handed to the consumer for one render cycle.
///
/// The borrow ends with the callback, so the consumer cannot keep it.
#[derive(Debug)]
pub struct ChannelBuffers<'a> {
    samples: &'a mut [f32],
    channels: usize,
    frames: usize,
}

impl<'a> ChannelBuffers<'a> {
    /// View `samples` as `channels` planar spans of `frames` samples each.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is shorter than `channels * frames`.
    pub fn new(samples: &'a mut [f32], channels: usize, frames: usize) -> Self {
        let len = channels * frames;
        assert!(
            samples.len() >= len,
            "planar storage holds {} samples, view needs {len}",
            samples.len()
        );
        Self {
            samples: &mut samples[..len],
            channels,
            frames,
        }
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Frames per channel.
    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Samples of channel `index`, or `None` past the last channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        if index < self.channels {
            let start = index * self.frames;
            Some(&self.samples[start..start + self.frames])
        } else {
            None
        }
    }

    /// Mutable samples of channel `index`, or `None` past the last channel.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        if index < self.channels {
            let start = index * self.frames;
            Some(&mut self.samples[start..start + self.frames])
        } else {
            None
        }
    }

    /// Iterate channels in order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.samples.chunks_exact(self.frames.max(1)).take(self.channels)
    }

    /// Iterate channels mutably in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let channels = self.channels;
        self.samples
            .chunks_exact_mut(self.frames.max(1))
            .take(channels)
    }

    /// Set every sample of every channel to `value`.
    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    /// Whether every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }
}

/// Copy `view.frame_count()` frames starting at frame `offset` of the hardware
/// list into the planar view. View channels the list does not carry are zeroed.
pub fn gather(list: &[HardwareBuffer<'_>], offset: usize, view: &mut ChannelBuffers<'_>) {
    let frames = view.frames;
    let mut next = 0;

    for buffer in list {
        let stride = usize::from(buffer.channels);
        for lane in 0..stride {
            let Some(dst) = view.channel_mut(next) else {
                break;
            };
            for (f, out) in dst.iter_mut().enumerate() {
                *out = buffer
                    .data
                    .get((offset + f) * stride + lane)
                    .copied()
                    .unwrap_or(0.0);
            }
            next += 1;
        }
    }

    for ch in next..view.channels {
        let start = ch * frames;
        view.samples[start..start + frames].fill(0.0);
    }
}

/// Copy the planar view into the hardware list starting at frame `offset`.
/// Hardware channels beyond the view are zeroed.
pub fn scatter(view: &ChannelBuffers<'_>, list: &mut [HardwareBufferMut<'_>], offset: usize) {
    let frames = view.frames;
    let mut next = 0;

    for buffer in list.iter_mut() {
        let stride = usize::from(buffer.channels);
        for lane in 0..stride {
            let src = view.channel(next);
            for f in 0..frames {
                if let Some(out) = buffer.data.get_mut((offset + f) * stride + lane) {
                    *out = src.map_or(0.0, |s| s[f]);
                }
            }
            next += 1;
        }
    }
}

/// Zero `frames` frames starting at `offset` in every buffer of the list.
pub fn silence(list: &mut [HardwareBufferMut<'_>], offset: usize, frames: usize) {
    for buffer in list.iter_mut() {
        let stride = usize::from(buffer.channels);
        let start = (offset * stride).min(buffer.data.len());
        let end = ((offset + frames) * stride).min(buffer.data.len());
        buffer.data[start..end].fill(0.0);
    }
}
