//! Consumer binding: who receives each render cycle.
//!
//! A manager is bound to exactly one consumer for its whole life, either a
//! render function or a weakly held [`AudioDelegate`]. The binding is owned by
//! the [`RenderEngine`](crate::RenderEngine), so reading it on the render
//! thread needs no synchronization. The only later change is a one-way
//! release through [`ReleaseHandle`], after which every cycle renders silence.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::buffer::ChannelBuffers;
use crate::error::RuntimeError;
use crate::events::{InterruptionPhase, RouteChange};

/// Per-cycle information passed alongside the buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderInfo {
    /// Effective sample rate in Hz.
    pub sample_rate: f64,
    /// Monotonic cycle counter, starting at zero.
    pub cycle: u64,
    /// Input channels carried by the view (zero when input is disabled).
    pub input_channels: u16,
    /// Output channels read back from the view (zero when output is disabled).
    pub output_channels: u16,
}

/// Render function. Reads input from and writes output into the view, in place.
pub type RenderFn = Box<dyn FnMut(&mut ChannelBuffers<'_>, &RenderInfo) + Send>;

/// Delegate receiving buffers and notifications.
///
/// Every method has an empty default. `on_buffer_available` runs on the
/// real-time thread and must not allocate, lock or block. The others run on
/// the observer thread.
pub trait AudioDelegate: Send + Sync {
    /// A render cycle is ready.
    fn on_buffer_available(&self, buffers: &mut ChannelBuffers<'_>, info: &RenderInfo) {
        let _ = (buffers, info);
    }

    /// The output route changed.
    fn on_route_changed(&self, change: &RouteChange) {
        let _ = change;
    }

    /// An interruption began or ended.
    fn on_interruption(&self, phase: InterruptionPhase) {
        let _ = phase;
    }

    /// A runtime failure was reported.
    fn on_error(&self, error: &RuntimeError) {
        let _ = error;
    }
}

/// The consumer bound to a manager.
pub enum ConsumerBinding {
    /// Render function.
    Function(RenderFn),
    /// Weakly held delegate. The owner must outlive the manager or release it first.
    ///
    /// Each cycle upgrades the `Weak` on the real-time thread. If the owner
    /// drops its last `Arc` while a cycle holds the upgraded one, the
    /// delegate's `Drop` and deallocation run on the real-time thread. Call
    /// [`AudioIoManager::release_binding`](crate::AudioIoManager::release_binding)
    /// or stop the manager before dropping a delegate with a costly destructor.
    Delegate(Weak<dyn AudioDelegate>),
    /// No consumer. Output is silence.
    Unbound,
}

impl ConsumerBinding {
    /// Bind a render function.
    pub fn function<F>(f: F) -> Self
    where
        F: FnMut(&mut ChannelBuffers<'_>, &RenderInfo) + Send + 'static,
    {
        Self::Function(Box::new(f))
    }

    /// Bind a delegate without taking ownership of it.
    pub fn delegate<D: AudioDelegate + 'static>(delegate: &Arc<D>) -> Self {
        let strong: Arc<dyn AudioDelegate> = delegate.clone();
        Self::Delegate(Arc::downgrade(&strong))
    }

    /// The delegate, if this is a delegate binding. Used for notifications.
    pub fn notifier(&self) -> Option<Weak<dyn AudioDelegate>> {
        match self {
            Self::Delegate(weak) => Some(weak.clone()),
            _ => None,
        }
    }

    /// Dispatch one cycle. Returns `false` when no consumer ran.
    #[inline]
    pub(crate) fn dispatch(&mut self, buffers: &mut ChannelBuffers<'_>, info: &RenderInfo) -> bool {
        match self {
            Self::Function(f) => {
                f(buffers, info);
                true
            }
            Self::Delegate(weak) => match weak.upgrade() {
                Some(delegate) => {
                    delegate.on_buffer_available(buffers, info);
                    true
                }
                None => false,
            },
            Self::Unbound => false,
        }
    }
}

impl fmt::Debug for ConsumerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("ConsumerBinding::Function"),
            Self::Delegate(weak) => f
                .debug_struct("ConsumerBinding::Delegate")
                .field("alive", &(weak.strong_count() > 0))
                .finish(),
            Self::Unbound => f.write_str("ConsumerBinding::Unbound"),
        }
    }
}

/// One-way release flag shared between the manager and the engine.
#[derive(Debug, Clone, Default)]
pub struct ReleaseHandle(Arc<AtomicBool>);

impl ReleaseHandle {
    /// A fresh, unreleased handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the binding. Later cycles render silence.
    pub fn release(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the binding has been released.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl AudioDelegate for Doubler {
        fn on_buffer_available(&self, buffers: &mut ChannelBuffers<'_>, _info: &RenderInfo) {
            for ch in buffers.iter_mut() {
                for s in ch.iter_mut() {
                    *s *= 2.0;
                }
            }
        }
    }

    fn info() -> RenderInfo {
        RenderInfo {
            sample_rate: 48000.0,
            cycle: 0,
            input_channels: 1,
            output_channels: 1,
        }
    }

    #[test]
    fn function_binding_runs() {
        let mut binding = ConsumerBinding::function(|buf, _| buf.fill(0.5));
        let mut storage = [0.0; 4];
        let mut view = ChannelBuffers::new(&mut storage, 1, 4);
        assert!(binding.dispatch(&mut view, &info()));
        assert_eq!(storage, [0.5; 4]);
    }

    #[test]
    fn plain_fn_coerces() {
        fn silence(buf: &mut ChannelBuffers<'_>, _: &RenderInfo) {
            buf.fill(0.0);
        }
        let binding = ConsumerBinding::function(silence);
        assert!(matches!(binding, ConsumerBinding::Function(_)));
    }

    #[test]
    fn delegate_binding_runs_while_alive() {
        let delegate = Arc::new(Doubler);
        let mut binding = ConsumerBinding::delegate(&delegate);
        let mut storage = [1.0; 2];
        let mut view = ChannelBuffers::new(&mut storage, 1, 2);
        assert!(binding.dispatch(&mut view, &info()));
        assert_eq!(storage, [2.0; 2]);
    }

    #[test]
    fn dropped_delegate_is_absent() {
        let delegate = Arc::new(Doubler);
        let mut binding = ConsumerBinding::delegate(&delegate);
        drop(delegate);
        let mut storage = [1.0; 2];
        let mut view = ChannelBuffers::new(&mut storage, 1, 2);
        assert!(!binding.dispatch(&mut view, &info()));
        assert!(binding.notifier().is_some());
    }

    #[test]
    fn release_is_one_way() {
        let handle = ReleaseHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_released());
        handle.release();
        assert!(clone.is_released());
    }
}
