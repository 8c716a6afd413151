//! Bounded real-time stream with synchronous subscribers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::detectors::EventKind;
use crate::error::{panic_message, MonitorError};

/// One streamed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPoint {
    /// Tick timestamp.
    pub timestamp: u64,
    /// Metrics after sampling and filtering.
    pub metrics: BTreeMap<String, f64>,
    /// Events active at this tick.
    pub events: Vec<EventKind>,
}

/// Subscriber callback.
pub type StreamCallback = Box<dyn FnMut(&StreamPoint) -> Result<(), MonitorError> + Send>;

/// Handle returned by [`StreamBuffer::subscribe`].
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Stop receiving points. Safe to call from inside the callback.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Whether the subscriber still receives points.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct Subscriber {
    id: u64,
    active: Arc<AtomicBool>,
    callback: StreamCallback,
}

/// FIFO buffer of stream points plus subscribers.
pub struct StreamBuffer {
    points: VecDeque<StreamPoint>,
    capacity: usize,
    open: bool,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("len", &self.points.len())
            .field("capacity", &self.capacity)
            .field("open", &self.open)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl StreamBuffer {
    /// Create a closed buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(1),
            open: false,
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Start accepting points.
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Stop accepting points and drop the buffered ones.
    pub fn close(&mut self) {
        self.open = false;
        self.points.clear();
    }

    /// Whether points are accepted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Change the capacity, evicting the oldest points if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Append a point and notify subscribers in subscription order.
    /// Ignored while closed.
    pub fn push(&mut self, point: StreamPoint) {
        if !self.open {
            return;
        }
        self.subscribers.retain(|s| s.active.load(Ordering::SeqCst));
        for subscriber in &mut self.subscribers {
            if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            let callback = &mut subscriber.callback;
            match catch_unwind(AssertUnwindSafe(|| callback(&point))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(
                        subscriber = subscriber.id,
                        error = %error,
                        "Stream subscriber error"
                    );
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(
                        subscriber = subscriber.id,
                        panic = %message,
                        "Stream subscriber panicked"
                    );
                }
            }
        }

        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Register a subscriber.
    pub fn subscribe(&mut self, callback: StreamCallback) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.push(Subscriber {
            id,
            active: Arc::clone(&active),
            callback,
        });
        Subscription { id, active }
    }

    /// Active subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.active.load(Ordering::SeqCst))
            .count()
    }

    /// Drop every subscriber. Outstanding handles become inactive.
    pub fn clear_subscribers(&mut self) {
        for subscriber in self.subscribers.drain(..) {
            subscriber.active.store(false, Ordering::SeqCst);
        }
    }

    /// Copy of the buffered points, oldest first.
    #[must_use]
    pub fn points(&self) -> Vec<StreamPoint> {
        self.points.iter().cloned().collect()
    }

    /// Buffered point count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
