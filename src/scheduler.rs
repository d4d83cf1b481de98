//! One-shot timers for the inactivity auto-lock.
//!
//! The session manager never sleeps or reads a clock itself. It asks a
//! [`Scheduler`] to run a callback once after a delay and keeps the returned
//! [`TimerHandle`] so it can cancel it on the next activity. Production code
//! uses [`TokioScheduler`]; tests drive [`ManualScheduler`] by hand.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{EnvelockError, Result};

/// Work to run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules callbacks to run once after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;
}

/// Cancels a scheduled callback. Cancelling after the callback ran, or
/// twice, is a no-op.
pub trait TimerHandle: Send {
    fn cancel(&mut self);
}

// ---------------------------------------------------------------------------
// Tokio
// ---------------------------------------------------------------------------

/// Runs each timer as a task on a tokio runtime.
///
/// Timers scheduled after the runtime has shut down are cancelled by tokio
/// and never fire; this is logged at `warn`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| EnvelockError::config("no tokio runtime available for the auto-lock timer"))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        if task.is_finished() {
            tracing::warn!(
                delay_ms = delay.as_millis() as u64,
                "tokio runtime is shut down; auto-lock timer will not fire"
            );
        }
        Box::new(TokioTimer(task.abort_handle()))
    }
}

struct TokioTimer(AbortHandle);

impl TimerHandle for TokioTimer {
    fn cancel(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

/// A fake clock. Time only moves when [`ManualScheduler::advance`] is
/// called, and due callbacks run on the caller's thread.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
}

#[derive(Default)]
struct ManualQueue {
    now: Duration,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

struct PendingTimer {
    id: u64,
    due: Duration,
    callback: TimerCallback,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, ManualQueue> {
        // A callback that panicked must not wedge the clock for later tests.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time elapsed on this clock.
    pub fn now(&self) -> Duration {
        self.queue().now
    }

    /// Number of timers scheduled and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        self.queue().pending.len()
    }

    /// Move the clock forward and run every callback that became due, in
    /// due order. Callbacks run without the queue locked, so they may
    /// schedule or cancel timers.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut queue = self.queue();
            queue.now += by;
            let now = queue.now;
            let (mut due, pending): (Vec<_>, Vec<_>) =
                queue.pending.drain(..).partition(|timer| timer.due <= now);
            queue.pending = pending;
            due.sort_by_key(|timer| (timer.due, timer.id));
            due
        };
        for timer in due {
            (timer.callback)();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let mut queue = self.queue();
        let id = queue.next_id;
        queue.next_id += 1;
        let due = queue.now + delay;
        queue.pending.push(PendingTimer { id, due, callback });
        Box::new(ManualTimer {
            id,
            queue: Arc::downgrade(&self.queue),
        })
    }
}

struct ManualTimer {
    id: u64,
    queue: std::sync::Weak<Mutex<ManualQueue>>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            let mut queue = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.pending.retain(|timer| timer.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&count);
        let make = move || -> TimerCallback {
            let c = Arc::clone(&shared);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_manual_fires_once_when_due() {
        let scheduler = ManualScheduler::new();
        let (count, make) = counter();
        let _handle = scheduler.schedule_once(Duration::from_secs(10), make());

        scheduler.advance(Duration::from_secs(9));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        scheduler.advance(Duration::from_secs(60));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_cancel() {
        let scheduler = ManualScheduler::new();
        let (count, make) = counter();
        let mut handle = scheduler.schedule_once(Duration::from_secs(5), make());
        handle.cancel();
        handle.cancel();
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_and_cancels() {
        let scheduler = TokioScheduler::current().unwrap();
        let (count, make) = counter();

        let _fires = scheduler.schedule_once(Duration::from_secs(30), make());
        let mut cancelled = scheduler.schedule_once(Duration::from_secs(30), make());
        cancelled.cancel();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokio_timer_after_shutdown_never_fires() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        drop(runtime);

        let (count, make) = counter();
        let mut handle = scheduler.schedule_once(Duration::from_millis(1), make());
        handle.cancel();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tokio_scheduler_needs_runtime() {
        assert!(TokioScheduler::current().is_err());
    }
}
