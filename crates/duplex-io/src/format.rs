//! Picking a stream configuration from what a device supports.

use cpal::{SampleFormat, SupportedBufferSize, SupportedStreamConfigRange};

/// One supported configuration range of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConfigRange {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    /// Fixed buffer size limits, when the host reports them.
    pub buffer: Option<(u32, u32)>,
    pub native_f32: bool,
}

impl From<&SupportedStreamConfigRange> for ConfigRange {
    fn from(range: &SupportedStreamConfigRange) -> Self {
        let buffer = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => Some((*min, *max)),
            SupportedBufferSize::Unknown => None,
        };
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate(),
            max_rate: range.max_sample_rate(),
            buffer,
            native_f32: range.sample_format() == SampleFormat::F32,
        }
    }
}

/// Configuration chosen for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DirectionFormat {
    /// Channels the stream is opened with.
    pub stream_channels: u16,
    /// Channels handed to the consumer.
    pub channels: u16,
    pub sample_rate: u32,
    pub buffer: Option<(u32, u32)>,
}

/// Choose a configuration carrying `channels` at the first of `rates` the
/// device supports.
///
/// Native `f32` ranges are preferred. Among the ranges supporting a rate, the
/// narrowest one carrying every requested channel wins; a device narrower than
/// the request falls back to its widest range.
pub(crate) fn choose(ranges: &[ConfigRange], channels: u16, rates: &[u32]) -> Option<DirectionFormat> {
    let native: Vec<&ConfigRange> = ranges.iter().filter(|r| r.native_f32).collect();
    let pool = if native.is_empty() {
        ranges.iter().collect()
    } else {
        native
    };

    for &rate in rates {
        let fits = pool
            .iter()
            .filter(|r| r.min_rate <= rate && rate <= r.max_rate);
        let best = fits
            .clone()
            .filter(|r| r.channels >= channels)
            .min_by_key(|r| r.channels)
            .or_else(|| fits.max_by_key(|r| r.channels));

        if let Some(range) = best {
            return Some(DirectionFormat {
                stream_channels: range.channels,
                channels: channels.min(range.channels),
                sample_rate: rate,
                buffer: range.buffer,
            });
        }
    }
    None
}

/// Clamp a fixed buffer size into every reported limit.
pub(crate) fn clamp_frames(frames: u32, limits: &[Option<(u32, u32)>]) -> u32 {
    let (lo, hi) = limits
        .iter()
        .flatten()
        .fold((0, u32::MAX), |(lo, hi), &(min, max)| (lo.max(min), hi.min(max)));
    if lo > hi {
        frames.max(lo)
    } else {
        frames.clamp(lo, hi)
    }
}
