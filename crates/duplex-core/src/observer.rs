//! Asynchronous event observer.
//!
//! A dedicated non-real-time thread, `duplex-events`, drains the channel the
//! platform session publishes into and hands each [`SessionEvent`] to an
//! [`EventHandler`]. The handler is held weakly: once its owner is gone the
//! thread exits on its own.

use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::events::SessionEvent;

/// Receives session events on the observer thread.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    fn handle_event(&self, event: SessionEvent);
}

/// Owns the observer thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct EventObserver {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl EventObserver {
    /// Spawn the observer thread.
    pub fn spawn<H>(events: Receiver<SessionEvent>, handler: Weak<H>) -> io::Result<Self>
    where
        H: EventHandler + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("duplex-events".into())
            .spawn(move || run(&events, &shutdown_rx, &handler))?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it. Idempotent.
    ///
    /// Calling this from the observer thread itself only signals it.
    pub fn shutdown(&mut self) {
        // Disconnecting the channel wakes the select below.
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("event observer thread panicked");
            }
        }
    }
}

impl Drop for EventObserver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<H: EventHandler>(events: &Receiver<SessionEvent>, shutdown: &Receiver<()>, handler: &Weak<H>) {
    tracing::debug!("event observer started");
    loop {
        select! {
            recv(events) -> msg => {
                let Ok(event) = msg else { break };
                let Some(handler) = handler.upgrade() else { break };
                handler.handle_event(event);
            }
            recv(shutdown) -> _ => break,
        }
    }
    tracing::debug!("event observer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<SessionEvent>>,
        notify: Mutex<Option<Sender<()>>>,
    }

    impl EventHandler for Recorder {
        fn handle_event(&self, event: SessionEvent) {
            self.seen.lock().push(event);
            if let Some(tx) = self.notify.lock().as_ref() {
                let _ = tx.send(());
            }
        }
    }

    #[test]
    fn delivers_events_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let recorder = Arc::new(Recorder::default());
        *recorder.notify.lock() = Some(done_tx);

        let mut observer = EventObserver::spawn(rx, Arc::downgrade(&recorder)).unwrap();
        tx.send(SessionEvent::VolumeChanged(0.25)).unwrap();
        tx.send(SessionEvent::VolumeChanged(0.5)).unwrap();
        for _ in 0..2 {
            done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        observer.shutdown();

        assert_eq!(
            *recorder.seen.lock(),
            vec![
                SessionEvent::VolumeChanged(0.25),
                SessionEvent::VolumeChanged(0.5)
            ]
        );
    }

    #[test]
    fn exits_when_sender_dropped() {
        let (tx, rx) = crossbeam_channel::unbounded::<SessionEvent>();
        let recorder = Arc::new(Recorder::default());
        let mut observer = EventObserver::spawn(rx, Arc::downgrade(&recorder)).unwrap();
        drop(tx);
        observer.shutdown();
        assert!(recorder.seen.lock().is_empty());
    }
}
