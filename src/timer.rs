// src/timer.rs
//
// Cooperative wall-clock timers.
//
// The trainer never sleeps. Deferred work (highlights, unlocks, the next
// target note) is queued as a task with a wall-clock deadline and a
// cancellation token; the embedding pumps the queue from its event loop.
// Cancelling a token invalidates every task armed with it at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

// ═══════════════════════════════════════════════════════════════════
// Clocks
// ═══════════════════════════════════════════════════════════════════

/// Source of wall-clock milliseconds.
pub trait WallClock {
    fn now_ms(&self) -> f64;
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Externally driven clock for tests, offline renders and hosts that
/// hand in their own timestamps. Clones share one time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Milliseconds stored as f64 bits (no AtomicF64 in std)
    millis_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, millis: f64) {
        self.millis_bits.store(millis.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, millis: f64) {
        self.set(self.now_ms() + millis);
    }
}

impl WallClock for ManualClock {
    #[inline]
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.millis_bits.load(Ordering::Relaxed))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════════

/// Shared cancellation flag. Clones observe the same flag; once cancelled
/// a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Timer queue
// ═══════════════════════════════════════════════════════════════════

pub type TimerId = u64;

#[derive(Debug)]
struct Timer<T> {
    id: TimerId,
    due_ms: f64,
    token: CancelToken,
    task: T,
}

/// Deadline-ordered queue of deferred tasks.
///
/// Tasks due at the same instant run in the order they were scheduled.
#[derive(Debug)]
pub struct TimerQueue<T> {
    timers: Vec<Timer<T>>,
    next_id: TimerId,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
        }
    }

    /// Arm `task` to run at `due_ms`, unless `token` is cancelled first.
    pub fn schedule(&mut self, due_ms: f64, token: &CancelToken, task: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;

        let index = self.timers.partition_point(|t| t.due_ms <= due_ms);
        self.timers.insert(
            index,
            Timer {
                id,
                due_ms,
                token: token.clone(),
                task,
            },
        );
        id
    }

    /// Disarm one timer. Returns false when it already ran or never existed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.iter().position(|t| t.id == id) {
            Some(index) => {
                self.timers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take the earliest task due at `now_ms`, skipping (and dropping)
    /// tasks whose token was cancelled.
    pub fn pop_due(&mut self, now_ms: f64) -> Option<T> {
        while self.timers.first().is_some_and(|t| t.due_ms <= now_ms) {
            let timer = self.timers.remove(0);
            if !timer.token.is_cancelled() {
                return Some(timer.task);
            }
        }
        None
    }

    /// Deadline of the earliest live timer.
    pub fn next_due(&self) -> Option<f64> {
        self.timers
            .iter()
            .find(|t| !t.token.is_cancelled())
            .map(|t| t.due_ms)
    }

    /// Drop every timer whose token was cancelled.
    pub fn purge_cancelled(&mut self) {
        self.timers.retain(|t| !t.token.is_cancelled());
    }

    #[inline]
    pub fn contains(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_run_in_deadline_order() {
        let token = CancelToken::new();
        let mut queue = TimerQueue::new();
        queue.schedule(30.0, &token, "c");
        queue.schedule(10.0, &token, "a");
        queue.schedule(10.0, &token, "b");

        assert_eq!(queue.pop_due(5.0), None);
        assert_eq!(queue.next_due(), Some(10.0));
        assert_eq!(queue.pop_due(20.0), Some("a"));
        assert_eq!(queue.pop_due(20.0), Some("b"));
        assert_eq!(queue.pop_due(20.0), None);
        assert_eq!(queue.pop_due(30.0), Some("c"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancelled_token_skips_tasks() {
        let stale = CancelToken::new();
        let fresh = CancelToken::new();
        let mut queue = TimerQueue::new();
        queue.schedule(10.0, &stale, 1);
        queue.schedule(20.0, &fresh, 2);

        stale.cancel();
        assert_eq!(queue.next_due(), Some(20.0));
        assert_eq!(queue.pop_due(100.0), Some(2));
        assert_eq!(queue.pop_due(100.0), None);
    }

    #[test]
    fn test_cancel_single_timer() {
        let token = CancelToken::new();
        let mut queue = TimerQueue::new();
        let id = queue.schedule(10.0, &token, ());
        assert!(queue.contains(id));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        assert_eq!(queue.pop_due(100.0), None);
    }

    #[test]
    fn test_purge_cancelled() {
        let token = CancelToken::new();
        let mut queue = TimerQueue::new();
        queue.schedule(10.0, &token, ());
        queue.schedule(20.0, &CancelToken::new(), ());
        token.cancel();
        queue.purge_cancelled();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.set(100.0);
        clock.advance(25.0);
        assert_eq!(view.now_ms(), 125.0);
    }
}
