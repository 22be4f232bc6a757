//! Single-slot dispatch queue for mutating requests.
//!
//! The target application only ever sees one mutating request at a time.
//! Admission is strict FIFO: the first caller takes the slot immediately,
//! later callers park on a oneshot waker in arrival order. The slot is
//! represented by an RAII [`DispatchPermit`]; dropping it hands the slot to
//! the next waiter, so release happens on every path out of a handler,
//! including panics and client aborts.
//!
//! There are no priorities, no cancellation of the slot holder, and no
//! barge-in. A waiter that gives up (its future dropped) is skipped at
//! hand-off time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct QueueState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
}

/// The process-wide serialization queue. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

impl DispatchQueue {
    /// Creates an idle queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the slot and returns the permit that holds it.
    ///
    /// Returns immediately when the queue is idle; otherwise parks this task
    /// behind every earlier waiter.
    pub async fn acquire(&self) -> DispatchPermit {
        let parked = {
            let mut state = self.inner.state.lock().expect("queue lock poisoned");
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = parked {
            // The sender side lives in the queue until a permit drop hands
            // the slot over; an Err here can only mean process teardown.
            let _ = rx.await;
        }

        DispatchPermit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Whether the slot is currently held.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.inner.state.lock().expect("queue lock poisoned").in_flight
    }

    /// Number of parked waiters.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("queue lock poisoned")
            .waiters
            .len()
    }
}

/// Holds the single mutating-request slot; dropping releases it.
#[derive(Debug)]
pub struct DispatchPermit {
    inner: Arc<Inner>,
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().expect("queue lock poisoned");
        loop {
            match state.waiters.pop_front() {
                Some(next) => {
                    // Hand-off keeps in_flight set. A waiter whose receiver
                    // is gone (client disconnected while parked) is skipped.
                    if next.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.in_flight = false;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn idle_queue_admits_immediately() {
        let queue = DispatchQueue::new();
        let permit = queue.acquire().await;
        assert!(queue.in_flight());
        assert_eq!(queue.depth(), 0);
        drop(permit);
        assert!(!queue.in_flight());
    }

    #[tokio::test]
    async fn second_acquire_parks_until_release() {
        let queue = DispatchQueue::new();
        let first = queue.acquire().await;

        let second = tokio::spawn({
            let queue = queue.clone();
            async move { queue.acquire().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.depth(), 1);

        drop(first);
        let permit = second.await.unwrap();
        assert!(queue.in_flight());
        drop(permit);
        assert!(!queue.in_flight());
    }

    #[tokio::test]
    async fn waiters_are_served_fifo() {
        let queue = DispatchQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = queue.acquire().await;

        let mut tasks = Vec::new();
        for i in 0..4 {
            let queue = queue.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let permit = queue.acquire().await;
                order.lock().unwrap().push(i);
                drop(permit);
            }));
            // Give each task time to park before spawning the next, so
            // arrival order is deterministic.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(queue.depth(), 4);
        drop(first);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn at_most_one_holder_at_any_instant() {
        let queue = DispatchQueue::new();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let permit = queue.acquire().await;
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                live.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_waiter_is_skipped() {
        let queue = DispatchQueue::new();
        let first = queue.acquire().await;

        let abandoned = tokio::spawn({
            let queue = queue.clone();
            async move { queue.acquire().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();
        let _ = abandoned.await;

        let third = tokio::spawn({
            let queue = queue.clone();
            async move { queue.acquire().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(first);
        let permit = third.await.unwrap();
        drop(permit);
        assert!(!queue.in_flight());
    }

    #[tokio::test]
    async fn release_survives_holder_panic() {
        let queue = DispatchQueue::new();
        let holder = tokio::spawn({
            let queue = queue.clone();
            async move {
                let _permit = queue.acquire().await;
                panic!("handler fault");
            }
        });
        assert!(holder.await.is_err());
        // The permit dropped during unwind; the slot must be free again.
        let permit = queue.acquire().await;
        drop(permit);
    }
}
