//! The stage-1 priority FIFO (`Q1`): one subqueue per kind, each with its
//! own wake condition, so that available capacity in one kind never waits
//! behind another kind's backlog. See spec §4.1 and the design note in §9
//! ("one FIFO per kind plus a shared condition per kind, not a single
//! heap").

use qnet_core::{Error, Kind, QueueItem, Request, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// Minimum number of recent wait samples required before the autoscaler is
/// allowed to act on `avg_wait` for a kind (spec §4.6 tie-breaking rule).
pub const MIN_WAIT_SAMPLES: usize = 3;

/// How many recent wait samples each subqueue retains for `avg_wait`.
const WAIT_HISTORY_CAP: usize = 256;

struct Subqueue {
    items: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    closed: AtomicBool,
    recent_waits: Mutex<VecDeque<(Instant, Duration)>>,
}

impl Subqueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            recent_waits: Mutex::new(VecDeque::new()),
        }
    }
}

/// The shared stage-1 priority FIFO. Priority across kinds is realized by
/// giving each kind an independent subqueue and independent worker pool
/// (see `pool1.rs`) rather than by a single ordered heap — see spec §9.
pub struct Queue1 {
    subqueues: [Subqueue; 3],
}

fn index_of(kind: Kind) -> usize {
    match kind {
        Kind::Z1 => 0,
        Kind::Z2 => 1,
        Kind::Z3 => 2,
    }
}

impl Queue1 {
    pub fn new() -> Self {
        Self {
            subqueues: [Subqueue::new(), Subqueue::new(), Subqueue::new()],
        }
    }

    fn sub(&self, kind: Kind) -> &Subqueue {
        &self.subqueues[index_of(kind)]
    }

    /// Inserts `request` at the tail of its kind's subqueue. Never blocks.
    pub async fn enqueue(&self, request: Request) -> Result<()> {
        let sub = self.sub(request.kind);
        if sub.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let item = QueueItem {
            request,
            enqueued_at: Instant::now(),
        };
        sub.items.lock().await.push_back(item);
        sub.notify.notify_one();
        Ok(())
    }

    /// Blocks until an item is available for `kind`, or the queue is
    /// closed and drained, in which case it returns `None`.
    pub async fn dequeue_for(&self, kind: Kind) -> Option<Request> {
        let sub = self.sub(kind);
        loop {
            // Register for notification before checking, so a concurrent
            // enqueue can't be missed between the check and the wait.
            let notified = sub.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = sub.items.lock().await.pop_front() {
                let wait = item.enqueued_at.elapsed();
                self.record_wait(sub, wait).await;
                return Some(item.request);
            }

            if sub.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    async fn record_wait(&self, sub: &Subqueue, wait: Duration) {
        let mut waits = sub.recent_waits.lock().await;
        waits.push_back((Instant::now(), wait));
        while waits.len() > WAIT_HISTORY_CAP {
            waits.pop_front();
        }
    }

    /// Marks `kind`'s subqueue closed and wakes every waiter. Already
    /// queued items remain dequeueable until drained.
    pub fn close(&self, kind: Kind) {
        let sub = self.sub(kind);
        sub.closed.store(true, Ordering::Release);
        sub.notify.notify_waiters();
    }

    /// Closes every subqueue.
    pub fn close_all(&self) {
        for kind in Kind::ALL {
            self.close(kind);
        }
    }

    /// Mean `(dequeue_time - enqueue_time)` across items of `kind` dequeued
    /// within `window` of now. Returns `None` if fewer than
    /// `MIN_WAIT_SAMPLES` samples fall inside the window.
    pub async fn avg_wait(&self, kind: Kind, window: Duration) -> Option<Duration> {
        let sub = self.sub(kind);
        let waits = sub.recent_waits.lock().await;
        let now = Instant::now();
        let mut total = Duration::ZERO;
        let mut count = 0usize;
        for (dequeued_at, wait) in waits.iter().rev() {
            if now.duration_since(*dequeued_at) > window {
                break;
            }
            total += *wait;
            count += 1;
        }
        if count < MIN_WAIT_SAMPLES {
            return None;
        }
        Some(total / count as u32)
    }
}

impl Default for Queue1 {
    fn default() -> Self {
        Self::new()
    }
}
