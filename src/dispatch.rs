//! Bounded cross-thread event queue.
//!
//! Producers (the capture pipeline and the ingress listener) enqueue without
//! blocking; a single consumer drains on a fixed poll interval. When the
//! queue is full the incoming event is dropped and the drop is logged, so a
//! stalled consumer degrades to lost alerts rather than a stalled capture
//! loop. Per-producer FIFO order is a property of the underlying channel.

use crate::DetectionEvent;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

/// Result of a non-blocking enqueue attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The queue was full; the event was discarded (drop-new policy).
    Dropped,
}

/// Factory for the producer/consumer pair.
pub struct EventDispatcher;

impl EventDispatcher {
    /// Build a queue holding at most `capacity` undelivered events, drained
    /// every `poll_interval`.
    pub fn bounded(capacity: usize, poll_interval: Duration) -> (EventProducer, EventConsumer) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (
            EventProducer { tx },
            EventConsumer { rx, poll_interval },
        )
    }
}

/// Cloneable enqueue handle. One clone per producing thread.
#[derive(Clone)]
pub struct EventProducer {
    tx: SyncSender<DetectionEvent>,
}

impl EventProducer {
    /// Non-blocking enqueue. A full queue drops the new event; a
    /// disconnected consumer (shutdown in progress) is treated the same way.
    pub fn enqueue(&self, event: DetectionEvent) -> EnqueueOutcome {
        match self.tx.try_send(event) {
            Ok(()) => EnqueueOutcome::Enqueued,
            Err(TrySendError::Full(event)) => {
                log::warn!(
                    "event queue full, dropping {} event {}",
                    event.classification(),
                    event.id
                );
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Disconnected(event)) => {
                log::warn!("event consumer gone, dropping event {}", event.id);
                EnqueueOutcome::Dropped
            }
        }
    }
}

/// Single-owner drain handle.
pub struct EventConsumer {
    rx: Receiver<DetectionEvent>,
    poll_interval: Duration,
}

impl EventConsumer {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Take everything currently queued, in arrival order, without blocking.
    pub fn drain(&self) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}
