//! Bounded queue implementation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::{debug, info};

use crate::{BackpressurePolicy, QueueConfig, QueueError};

/// Outcome of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting this many older frames
    Evicted(usize),
}

#[derive(Debug)]
struct Shared {
    consumer_alive: AtomicBool,
    dropped: AtomicU64,
}

/// Producer half, owned by the acquisition thread
pub struct FrameProducer<T> {
    tx: Sender<T>,
    /// Only held under drop-oldest, so the producer can evict
    evict: Option<Receiver<T>>,
    shared: Arc<Shared>,
}

/// Consumer half, owned by the monitor thread
pub struct FrameConsumer<T> {
    rx: Receiver<T>,
    shared: Arc<Shared>,
}

/// Create a bounded queue
pub fn bounded<T>(config: &QueueConfig) -> (FrameProducer<T>, FrameConsumer<T>) {
    let capacity = config.capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let shared = Arc::new(Shared {
        consumer_alive: AtomicBool::new(true),
        dropped: AtomicU64::new(0),
    });

    info!(
        "Frame queue created: capacity={}, policy={}",
        capacity, config.policy
    );

    let evict = match config.policy {
        BackpressurePolicy::DropOldest => Some(rx.clone()),
        BackpressurePolicy::BlockProducer => None,
    };

    (
        FrameProducer {
            tx,
            evict,
            shared: shared.clone(),
        },
        FrameConsumer { rx, shared },
    )
}

impl<T> FrameProducer<T> {
    /// Push a frame, applying the backpressure policy when full
    pub fn push(&self, frame: T) -> Result<PushOutcome, QueueError> {
        let Some(evict) = &self.evict else {
            self.tx.send(frame).map_err(|_| QueueError::Disconnected)?;
            return Ok(PushOutcome::Queued);
        };

        if !self.shared.consumer_alive.load(Ordering::Acquire) {
            return Err(QueueError::Disconnected);
        }

        let mut frame = frame;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => {
                    return Ok(if evicted == 0 {
                        PushOutcome::Queued
                    } else {
                        PushOutcome::Evicted(evicted)
                    });
                }
                Err(TrySendError::Full(back)) => {
                    frame = back;
                    // Consumer may have drained it in between
                    if evict.try_recv().is_ok() {
                        evicted += 1;
                        let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!("Queue full, evicted oldest frame ({} dropped total)", total);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
            }
        }
    }

    /// Frames evicted so far
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> FrameConsumer<T> {
    /// Wait for the next frame; fails once the producer is gone and the
    /// queue is drained
    pub fn recv(&self) -> Result<T, QueueError> {
        self.rx.recv().map_err(|_| QueueError::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => QueueError::Timeout,
            RecvTimeoutError::Disconnected => QueueError::Disconnected,
        })
    }

    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking iterator until the producer hangs up
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.iter()
    }

    /// Frames evicted by the producer so far
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }
}

impl<T> Drop for FrameConsumer<T> {
    fn drop(&mut self) {
        self.shared.consumer_alive.store(false, Ordering::Release);
    }
}
