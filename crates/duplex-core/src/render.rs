//! Render callback bridge.
//!
//! [`RenderEngine::render`] is the real-time entry point. The hardware calls
//! it once per buffer period with its native input and output buffer lists.
//! Each call:
//!
//! 1. gathers input into the planar scratch view (or zeroes it),
//! 2. dispatches the consumer binding in place,
//! 3. scatters the view back into the output list.
//!
//! ## Real-time safety
//!
//! The scratch view is sized by [`RenderEngine::configure`], which runs on a
//! non-real-time thread while the engine is disarmed. `render` itself never
//! allocates, locks or blocks. Blocks longer than the negotiated frame count
//! are split into negotiated-size chunks. A consumer that runs past the
//! buffer period is not interrupted; the overrun is counted in
//! [`RenderStats`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::binding::{ConsumerBinding, ReleaseHandle, RenderInfo};
use crate::buffer::{
    ChannelBuffers, HardwareBuffer, HardwareBufferMut, gather, list_frames, list_frames_mut,
    scatter, silence,
};
use crate::config::NegotiatedParams;

/// Lock-free render counters, shared between the engine and the manager.
#[derive(Debug, Default)]
pub struct RenderStats {
    cycles: AtomicU64,
    silent_cycles: AtomicU64,
    overruns: AtomicU64,
    last_cycle_nanos: AtomicU64,
}

/// Point-in-time copy of [`RenderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Cycles dispatched.
    pub cycles: u64,
    /// Cycles rendered as silence because no consumer ran.
    pub silent_cycles: u64,
    /// Hardware callbacks that took longer than their buffer period.
    pub overruns: u64,
    /// Wall time of the most recent hardware callback.
    pub last_cycle: Duration,
}

impl RenderStats {
    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            silent_cycles: self.silent_cycles.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            last_cycle: Duration::from_nanos(self.last_cycle_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Owns the consumer binding and the scratch view; called on the real-time thread.
pub struct RenderEngine {
    binding: ConsumerBinding,
    release: ReleaseHandle,
    stats: Arc<RenderStats>,
    params: NegotiatedParams,
    scratch: Vec<f32>,
    cycle: u64,
}

impl RenderEngine {
    /// Create an engine around a binding. Call [`configure`](Self::configure)
    /// before the first render; an unconfigured engine renders silence.
    pub fn new(binding: ConsumerBinding) -> Self {
        Self {
            binding,
            release: ReleaseHandle::new(),
            stats: Arc::new(RenderStats::default()),
            params: NegotiatedParams {
                sample_rate: 0.0,
                input_channels: 0,
                output_channels: 0,
                buffer_frame_count: 0,
            },
            scratch: Vec::new(),
            cycle: 0,
        }
    }

    /// Size the scratch view for `params`. Not real-time safe.
    pub fn configure(&mut self, params: NegotiatedParams) {
        let len = params.view_channels() * params.buffer_frame_count as usize;
        self.scratch.clear();
        self.scratch.resize(len, 0.0);
        self.params = params;
    }

    /// Parameters the engine is currently sized for.
    pub fn params(&self) -> &NegotiatedParams {
        &self.params
    }

    /// Shared render counters.
    pub fn stats(&self) -> Arc<RenderStats> {
        Arc::clone(&self.stats)
    }

    /// Handle that releases the binding from any thread.
    pub fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }

    /// Process one hardware callback.
    ///
    /// `input` is `None` when capture is disabled. `output` may be empty when
    /// playback is disabled.
    pub fn render(
        &mut self,
        input: Option<&[HardwareBuffer<'_>]>,
        output: &mut [HardwareBufferMut<'_>],
    ) {
        let started = Instant::now();
        let total = if output.is_empty() {
            input.map_or(0, list_frames)
        } else {
            list_frames_mut(output)
        };

        let chunk = self.params.buffer_frame_count as usize;
        let view_channels = self.params.view_channels();
        if chunk == 0 || view_channels == 0 {
            silence(output, 0, total);
            return;
        }

        let input = input.filter(|_| self.params.input_channels > 0);
        let write_output = self.params.output_channels > 0;
        let info_base = RenderInfo {
            sample_rate: self.params.sample_rate,
            cycle: 0,
            input_channels: self.params.input_channels,
            output_channels: self.params.output_channels,
        };

        let mut offset = 0;
        while offset < total {
            let frames = chunk.min(total - offset);
            let mut view = ChannelBuffers::new(&mut self.scratch, view_channels, frames);

            match input {
                Some(list) => gather(list, offset, &mut view),
                None => view.fill(0.0),
            }

            let info = RenderInfo {
                cycle: self.cycle,
                ..info_base
            };
            let ran = !self.release.is_released() && self.binding.dispatch(&mut view, &info);
            if !ran {
                view.fill(0.0);
                self.stats.silent_cycles.fetch_add(1, Ordering::Relaxed);
            }

            if write_output {
                scatter(&view, output, offset);
            } else {
                silence(output, offset, frames);
            }

            self.cycle = self.cycle.wrapping_add(1);
            self.stats.cycles.fetch_add(1, Ordering::Relaxed);
            offset += frames;
        }

        let elapsed = started.elapsed();
        let budget_nanos = if self.params.sample_rate > 0.0 {
            (total as f64 * 1e9 / self.params.sample_rate) as u64
        } else {
            u64::MAX
        };
        let elapsed_nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.stats
            .last_cycle_nanos
            .store(elapsed_nanos, Ordering::Relaxed);
        if elapsed_nanos > budget_nanos {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("binding", &self.binding)
            .field("params", &self.params)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}
