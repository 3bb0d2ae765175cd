//! Default-device watcher.
//!
//! cpal has no route notifications, so a background thread polls the host's
//! default devices and reports a [`SessionEvent::RouteChanged`] when either
//! one changes.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use duplex_core::{EventSink, RouteChange, RouteChangeReason, SessionEvent};

use crate::devices::{DeviceKind, default_of, device_name, devices_of};

/// Which default devices to watch. Pinned devices are not watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Watch {
    pub input: bool,
    pub output: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Defaults {
    input: Option<String>,
    output: Option<String>,
}

impl Defaults {
    fn read(watch: Watch) -> Self {
        let host = cpal::default_host();
        let name = |kind| default_of(&host, kind).and_then(|d| device_name(&d).ok());
        Self {
            input: watch.input.then(|| name(DeviceKind::Input)).flatten(),
            output: watch.output.then(|| name(DeviceKind::Output)).flatten(),
        }
    }
}

/// Running poller. Dropping it stops the thread.
#[derive(Debug)]
pub(crate) struct RoutePoller {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RoutePoller {
    pub(crate) fn spawn(sink: EventSink, watch: Watch, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("duplex-route-poll".into())
            .spawn(move || {
                let mut last = Defaults::read(watch);
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let current = Defaults::read(watch);
                    if current == last {
                        continue;
                    }
                    let change = describe_change(&last, &current);
                    tracing::debug!(reason = %change.reason, route = %change.description, "default device changed");
                    if sink.send(SessionEvent::RouteChanged(change)).is_err() {
                        break;
                    }
                    last = current;
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

impl Drop for RoutePoller {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn describe_change(last: &Defaults, current: &Defaults) -> RouteChange {
    let (kind, previous, now) = if last.output == current.output {
        (DeviceKind::Input, &last.input, &current.input)
    } else {
        (DeviceKind::Output, &last.output, &current.output)
    };

    let reason = match previous {
        Some(name) if !still_present(kind, name) => RouteChangeReason::OldDeviceUnavailable,
        _ => RouteChangeReason::NewDeviceAvailable,
    };
    let description = now.clone().unwrap_or_else(|| format!("no {kind} device"));
    RouteChange::new(reason, description)
}

fn still_present(kind: DeviceKind, name: &str) -> bool {
    devices_of(&cpal::default_host(), kind).is_ok_and(|devices| {
        devices
            .iter()
            .any(|d| device_name(d).is_ok_and(|n| n == name))
    })
}
