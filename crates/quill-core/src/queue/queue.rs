//! Bounded priority queue feeding the agent engine.
//!
//! Multiple producers enqueue concurrently; a single logical consumer drains
//! with [`MessageQueue::recv`]. Ordering is strict by priority with FIFO
//! tie-break inside a tier (sequence numbers assigned under the queue lock).
//! Capacity is hard (overflow drops the new message); the backpressure
//! threshold is soft and only surfaces through [`QueueMetrics`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;

use super::message::Message;

/// Queue failure modes. Overflow is not an error: `enqueue` reports a
/// dropped message as `Ok(false)` and leaves retry policy to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("message queue is closed")]
    Closed,

    #[error("invalid queue configuration: backpressure threshold {threshold} must be between 1 and capacity {capacity} exclusive")]
    InvalidConfig { capacity: usize, threshold: usize },
}

/// Point-in-time queue health, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    pub queue_size: usize,
    pub total_capacity: usize,
    /// Messages handed to the consumer per second since construction.
    pub throughput: f64,
    /// True while queue size exceeds the backpressure threshold.
    pub backpressure_active: bool,
    /// Mean enqueue-to-dequeue wait.
    pub average_latency: Duration,
    pub messages_processed: u64,
}

struct QueuedMessage {
    message: Message,
    seq: u64,
    enqueued_at: Instant,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // Max-heap: higher priority wins, then lower sequence (older) wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueInner {
    heap: BinaryHeap<QueuedMessage>,
    next_seq: u64,
    closed: bool,
    dequeued: u64,
    dropped: u64,
    total_wait: Duration,
}

/// Priority message queue with bounded capacity and soft backpressure.
pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
    backpressure_threshold: usize,
    created_at: Instant,
}

impl MessageQueue {
    /// Build a queue. The threshold must sit strictly between zero and the
    /// capacity, otherwise backpressure would be meaningless.
    pub fn new(capacity: usize, backpressure_threshold: usize) -> Result<Self, QueueError> {
        if capacity == 0 || backpressure_threshold == 0 || backpressure_threshold >= capacity {
            return Err(QueueError::InvalidConfig {
                capacity,
                threshold: backpressure_threshold,
            });
        }

        Ok(Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
                dequeued: 0,
                dropped: 0,
                total_wait: Duration::ZERO,
            }),
            notify: Notify::new(),
            capacity,
            backpressure_threshold,
            created_at: Instant::now(),
        })
    }

    /// Enqueue a message. `Ok(true)` means accepted, `Ok(false)` means the
    /// queue was at capacity and the message was dropped.
    pub fn enqueue(&self, message: Message) -> Result<bool, QueueError> {
        let msg_type = message.payload.message_type();
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }

            if inner.heap.len() >= self.capacity {
                inner.dropped += 1;
                tracing::warn!(
                    capacity = self.capacity,
                    message_type = ?msg_type,
                    "queue at capacity, dropping message"
                );
                return Ok(false);
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(QueuedMessage {
                message,
                seq,
                enqueued_at: Instant::now(),
            });

            if inner.heap.len() > self.backpressure_threshold {
                tracing::debug!(
                    queue_size = inner.heap.len(),
                    threshold = self.backpressure_threshold,
                    "queue above backpressure threshold"
                );
            }
        }

        self.notify.notify_one();
        Ok(true)
    }

    /// Receive the next message, suspending while the queue is empty.
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn recv(&self) -> Option<Message> {
        loop {
            // Future created first so a permit stored by a racing
            // `notify_one` is never lost between the check and the await.
            let notified = self.notify.notified();

            {
                let mut inner = self.inner.lock();
                if let Some(entry) = inner.heap.pop() {
                    inner.dequeued += 1;
                    inner.total_wait += entry.enqueued_at.elapsed();
                    return Some(entry.message);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Close the queue. Pending messages remain receivable; new enqueues
    /// fail with [`QueueError::Closed`].
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        tracing::info!("message queue closed");
        // notify_one stores a permit, covering a consumer that has not
        // registered its waiter yet.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages dropped at capacity since construction.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn metrics(&self) -> QueueMetrics {
        let inner = self.inner.lock();
        let elapsed = self.created_at.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            inner.dequeued as f64 / elapsed
        } else {
            0.0
        };
        let average_latency = if inner.dequeued > 0 {
            inner.total_wait.div_f64(inner.dequeued as f64)
        } else {
            Duration::ZERO
        };

        QueueMetrics {
            queue_size: inner.heap.len(),
            total_capacity: self.capacity,
            throughput,
            backpressure_active: inner.heap.len() > self.backpressure_threshold,
            average_latency,
            messages_processed: inner.dequeued,
        }
    }
}
