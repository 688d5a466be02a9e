//! Stage-2 per-kind FIFOs (`Q2x`): plain queues, no priority, feeding a
//! single fallible processor per kind (spec §4.4).

use qnet_core::{Error, Kind, Request, Result};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub struct Queue2 {
    kind: Kind,
    tx: mpsc::UnboundedSender<Request>,
    rx: Mutex<mpsc::UnboundedReceiver<Request>>,
}

impl Queue2 {
    pub fn new(kind: Kind) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            kind,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Inserts `req` at the tail of the queue. Unbounded, so this never
    /// blocks; fails only once the queue has been permanently closed.
    pub fn enqueue(&self, req: Request) -> Result<()> {
        self.tx.send(req).map_err(|_| Error::Closed)
    }

    /// Blocks until a request is available, or the queue is closed and
    /// drained.
    pub async fn dequeue(&self) -> Option<Request> {
        self.rx.lock().await.recv().await
    }

    /// Like `dequeue`, but gives up after `idle_timeout` with `Ok(None)`
    /// distinguished from a closed queue via the outer `Result`. Used by
    /// `P2x` to detect its own idle-timeout self-termination condition
    /// (spec §4.4 point 3).
    pub async fn dequeue_timeout(&self, idle_timeout: Duration) -> DequeueOutcome {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(req)) => DequeueOutcome::Item(req),
            Ok(None) => DequeueOutcome::Closed,
            Err(_) => DequeueOutcome::Idle,
        }
    }
}

// Q2x has no explicit `close`: it closes naturally once every clone of
// `Distributor`'s sender handle is dropped at engine shutdown, at which
// point `dequeue`/`dequeue_timeout` start returning `None`/`Closed`.

pub enum DequeueOutcome {
    Item(Request),
    Idle,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn req(kind: Kind, id: u64) -> Request {
        Request {
            id,
            kind,
            origin: 1,
            created_at: Instant::now(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = Queue2::new(Kind::Z1);
        q.enqueue(req(Kind::Z1, 1)).unwrap();
        q.enqueue(req(Kind::Z1, 2)).unwrap();
        assert_eq!(q.dequeue().await.unwrap().id, 1);
        assert_eq!(q.dequeue().await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn dequeue_timeout_reports_idle() {
        let q = Queue2::new(Kind::Z2);
        let outcome = q.dequeue_timeout(Duration::from_millis(20)).await;
        assert!(matches!(outcome, DequeueOutcome::Idle));
    }

    #[tokio::test]
    async fn dequeue_timeout_reports_item() {
        let q = Queue2::new(Kind::Z3);
        q.enqueue(req(Kind::Z3, 9)).unwrap();
        match q.dequeue_timeout(Duration::from_millis(50)).await {
            DequeueOutcome::Item(r) => assert_eq!(r.id, 9),
            _ => panic!("expected item"),
        }
    }
}
