//! Priority-ordered execution slots
//!
//! An agent owns one `PriorityGate` with `max_concurrent_messages` slots. When
//! every slot is taken, callers queue by priority (lower value first) and then
//! by arrival order. A released slot is handed directly to the next waiter, so
//! a late arrival can never overtake the queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

struct Waiter {
    priority: i32,
    sequence: u64,
    wake: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the "greatest" waiter is the lowest
        // priority value, then the earliest sequence.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct GateState {
    available: usize,
    next_sequence: u64,
    waiters: BinaryHeap<Waiter>,
}

struct GateInner {
    capacity: usize,
    state: Mutex<GateState>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the slot to the best live waiter, or return it to the pool
    fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop() {
            if waiter.wake.send(()).is_ok() {
                return;
            }
        }
        state.available += 1;
    }
}

/// Bounded, priority-ordered slot pool
#[derive(Clone)]
pub struct PriorityGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for PriorityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityGate")
            .field("capacity", &self.inner.capacity)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}

impl PriorityGate {
    /// A gate with `capacity` slots; zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(GateInner {
                capacity,
                state: Mutex::new(GateState {
                    available: capacity,
                    next_sequence: 0,
                    waiters: BinaryHeap::new(),
                }),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Highest number of slots ever held at once
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Callers waiting for a slot
    pub fn queued(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Wait for a slot. The slot is released when the permit drops.
    pub async fn acquire(&self, priority: i32) -> SlotPermit {
        let receiver = {
            let mut state = self.inner.lock();
            if state.available > 0 && state.waiters.is_empty() {
                state.available -= 1;
                None
            } else {
                let (wake, receiver) = oneshot::channel();
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.waiters.push(Waiter {
                    priority,
                    sequence,
                    wake,
                });
                Some(receiver)
            }
        };

        if let Some(receiver) = receiver {
            let mut pending = PendingSlot {
                receiver,
                gate: Arc::clone(&self.inner),
            };
            // The sender lives in the heap until a release hands it a slot,
            // and the gate outlives this future, so the channel cannot close.
            let _ = (&mut pending.receiver).await;
        }

        self.grant()
    }

    fn grant(&self) -> SlotPermit {
        let now = self.inner.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.inner
            .peak_in_flight
            .fetch_max(now, AtomicOrdering::SeqCst);
        SlotPermit {
            gate: Arc::clone(&self.inner),
        }
    }
}

/// A queued acquire; if dropped after being handed a slot, passes it on
struct PendingSlot {
    receiver: oneshot::Receiver<()>,
    gate: Arc<GateInner>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.receiver.close();
        if self.receiver.try_recv().is_ok() {
            self.gate.release();
        }
    }
}

/// Held while a handler runs
pub struct SlotPermit {
    gate: Arc<GateInner>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.gate.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn test_immediate_acquire_within_capacity() {
        let gate = PriorityGate::new(2);
        let a = gate.acquire(0).await;
        let b = gate.acquire(0).await;
        assert_eq!(gate.in_flight(), 2);
        drop(a);
        drop(b);
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_one() {
        let gate = PriorityGate::new(0);
        assert_eq!(gate.capacity(), 1);
        let _permit = gate.acquire(0).await;
        assert_eq!(gate.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_waiters_served_by_priority_then_arrival() {
        let gate = PriorityGate::new(1);
        let order = Arc::new(AsyncMutex::new(Vec::new()));
        let blocker = gate.acquire(0).await;

        let mut handles = Vec::new();
        for (label, priority) in [("p5", 5), ("p1-first", 1), ("p3", 3), ("p1-second", 1)] {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire(priority).await;
                order.lock().await.push(label);
            }));
            // Let the task enqueue before the next one arrives
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(gate.queued(), 4);
        drop(blocker);

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            *order.lock().await,
            vec!["p1-first", "p1-second", "p3", "p5"]
        );
        assert_eq!(gate.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_leak_slot() {
        let gate = PriorityGate::new(1);
        let blocker = gate.acquire(0).await;

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire(0).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiting.abort();
        let _ = waiting.await;

        drop(blocker);

        let permit = tokio::time::timeout(Duration::from_millis(200), gate.acquire(0)).await;
        assert!(permit.is_ok(), "slot should be available again");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bound_holds_under_contention() {
        let gate = PriorityGate::new(3);
        let handles: Vec<_> = (0..40)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    let _permit = gate.acquire(i % 4).await;
                    assert!(gate.in_flight() <= 3);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(gate.peak_in_flight() <= 3);
        assert_eq!(gate.in_flight(), 0);
    }
}
