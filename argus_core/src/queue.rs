//! Generic worker queue with explicit lifecycle and backpressure.
//!
//! A [`WorkQueue`] owns one background worker thread that drains posted items
//! in FIFO order through a caller-supplied callback. The callback returns
//! `bool`: `true` pops the item, `false` means "could not process yet" and
//! leaves the item at the head. After a failure the worker parks until the
//! queue length changes (a new [`WorkQueue::post`]) or an explicit
//! [`WorkQueue::notify`] forces a re-check, so a persistently failing head
//! blocks the whole queue instead of being skipped.
//!
//! Missed wakeups are benign: every wake unconditionally rechecks queue
//! emptiness, and the head item is never skipped.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::trace;

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    /// No worker running; posts are rejected.
    Idle,
    /// Worker draining the queue.
    Run,
    /// Graceful shutdown: drain remaining items, then exit.
    Stop,
    /// Immediate shutdown: drop remaining items, then exit.
    Abort,
    /// A forced re-check was requested; reverts to Run on wake.
    Trigger,
    /// No worker; posts execute synchronously on the caller's thread.
    Prompt,
}

type Callback<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Inner<T> {
    items: VecDeque<T>,
    /// Logical queue length. Includes an item currently inside the callback,
    /// so producers observing `size()` never see the in-flight item vanish
    /// before it was processed.
    len: usize,
    state: QueueState,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    callback: Callback<T>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe FIFO work queue with head-of-line blocking retry.
pub struct WorkQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Create a queue with the given processing callback and start its
    /// worker immediately.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let queue = Self::idle(callback);
        queue.start();
        queue
    }

    /// Create a queue without starting the worker (Idle). Posts fail until
    /// [`WorkQueue::start`] or [`WorkQueue::enable_prompt_execution`].
    pub fn idle<F>(callback: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    items: VecDeque::new(),
                    len: 0,
                    state: QueueState::Idle,
                }),
                cond: Condvar::new(),
                callback: Box::new(callback),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker thread. Fails (returns `false`) unless Idle.
    pub fn start(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != QueueState::Idle {
            return false;
        }
        inner.state = QueueState::Run;
        drop(inner);

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || worker_loop(&shared));
        *self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Append an item and wake the worker.
    ///
    /// In Prompt mode the callback runs synchronously on the calling thread
    /// and its result is returned. When Idle the item is rejected (`false`).
    pub fn post(&self, item: T) -> bool {
        let mut inner = self.shared.lock();
        match inner.state {
            QueueState::Prompt => {
                // Callback runs outside the lock; the queue is known empty.
                drop(inner);
                (self.shared.callback)(&item)
            }
            QueueState::Idle => false,
            _ => {
                inner.items.push_back(item);
                inner.len += 1;
                self.shared.cond.notify_one();
                true
            }
        }
    }

    /// Force the worker to re-check the head item even though the queue
    /// length has not changed. Only meaningful while running.
    pub fn notify(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != QueueState::Run {
            return false;
        }
        inner.state = QueueState::Trigger;
        self.shared.cond.notify_one();
        true
    }

    /// Request graceful shutdown: remaining items are drained, then the
    /// worker exits. No-op (returns `false`) when Idle.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state == QueueState::Idle {
            return false;
        }
        inner.state = QueueState::Stop;
        self.shared.cond.notify_one();
        true
    }

    /// Request immediate shutdown: remaining items are dropped unprocessed.
    /// No-op (returns `false`) when Idle.
    pub fn abort(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state == QueueState::Idle {
            return false;
        }
        inner.state = QueueState::Abort;
        self.shared.cond.notify_one();
        true
    }

    /// Block until the worker has exited, requesting shutdown first if it is
    /// still running (`abort` selects drop-vs-drain). No-op when Idle or in
    /// Prompt mode.
    pub fn wait(&self, abort: bool) -> bool {
        {
            let mut inner = self.shared.lock();
            if inner.state == QueueState::Idle || inner.state == QueueState::Prompt {
                return false;
            }
            if inner.state == QueueState::Run {
                inner.state = if abort {
                    QueueState::Abort
                } else {
                    QueueState::Stop
                };
                self.shared.cond.notify_one();
            }
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // A panicking callback already unwound the worker; nothing left
            // to clean up here.
            let _ = handle.join();
        }
        true
    }

    /// Switch to synchronous execution on the caller's thread. Only allowed
    /// when Idle with an empty queue.
    pub fn enable_prompt_execution(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != QueueState::Idle || inner.len > 0 {
            return false;
        }
        inner.state = QueueState::Prompt;
        true
    }

    /// Leave Prompt mode, back to Idle. Only allowed in Prompt mode.
    pub fn disable_prompt_execution(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != QueueState::Prompt {
            return false;
        }
        inner.state = QueueState::Idle;
        true
    }

    /// Number of items pending, including one currently being processed.
    pub fn size(&self) -> usize {
        self.shared.lock().len
    }

    /// Whether no items are pending.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T: Send + 'static> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.wait(true);
    }
}

fn worker_loop<T>(shared: &Shared<T>) {
    let mut inner = shared.lock();

    // Snapshot of the queue length taken when the head failed to process.
    // While len stays at this value there is nothing new to try. Zero means
    // process freely.
    let mut allowed = 0usize;

    loop {
        while inner.len == allowed && inner.state == QueueState::Run {
            inner = shared
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if inner.state == QueueState::Abort {
            break;
        }
        if inner.state == QueueState::Stop && inner.items.is_empty() {
            break;
        }
        if inner.state == QueueState::Trigger {
            inner.state = QueueState::Run;
        }

        // The wake may have been a trigger on an empty queue.
        let Some(item) = inner.items.pop_front() else {
            continue;
        };
        allowed = inner.len;

        // The queue may grow while unlocked; a lost signal is harmless since
        // the non-empty queue is detected on the next pass.
        drop(inner);
        let done = (shared.callback)(&item);
        inner = shared.lock();

        if done {
            allowed = 0;
            inner.len -= 1;
        } else {
            // Head goes back unprocessed; park until len != allowed.
            inner.items.push_front(item);
        }
    }

    trace!(dropped = inner.len, "queue worker exiting");
    inner.items.clear();
    inner.len = 0;
    inner.state = QueueState::Idle;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn settle() {
        std::thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn delivers_fifo_exactly_once() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let q = WorkQueue::new(move |n: &u32| {
            sink.lock().unwrap().push(*n);
            true
        });

        for n in 0..100u32 {
            assert!(q.post(n));
        }
        q.wait(false);

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn failing_head_blocks_until_new_post() {
        let accept = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, c) = (Arc::clone(&accept), Arc::clone(&calls));
        let q = WorkQueue::new(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
            a.load(Ordering::SeqCst)
        });

        q.post(1);
        settle();
        // Head failed once and the worker parked; size still counts it.
        assert_eq!(q.size(), 1);
        let stalled = calls.load(Ordering::SeqCst);
        settle();
        assert_eq!(calls.load(Ordering::SeqCst), stalled);

        // A new post changes the length and re-triggers the head.
        accept.store(true, Ordering::SeqCst);
        q.post(2);
        settle();
        assert_eq!(q.size(), 0);
        assert!(calls.load(Ordering::SeqCst) >= stalled + 2);
    }

    #[test]
    fn notify_retriggers_failing_head() {
        let accept = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let (a, s) = (Arc::clone(&accept), Arc::clone(&seen));
        let q = WorkQueue::new(move |n: &u32| {
            if a.load(Ordering::SeqCst) {
                s.lock().unwrap().push(*n);
                true
            } else {
                false
            }
        });

        q.post(7);
        q.post(8);
        settle();
        // Both parked behind the failing head; nothing was skipped.
        assert_eq!(q.size(), 2);
        assert!(seen.lock().unwrap().is_empty());

        accept.store(true, Ordering::SeqCst);
        assert!(q.notify());
        settle();
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn stop_drains_remaining_items() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let q = WorkQueue::new(move |_: &u32| {
            std::thread::sleep(Duration::from_millis(1));
            c.fetch_add(1, Ordering::SeqCst);
            true
        });

        for n in 0..20u32 {
            q.post(n);
        }
        q.stop();
        q.wait(false);
        assert_eq!(count.load(Ordering::SeqCst), 20);
        assert!(q.is_empty());
    }

    #[test]
    fn abort_drops_remaining_items() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let q = WorkQueue::new(move |_: &u32| {
            std::thread::sleep(Duration::from_millis(5));
            c.fetch_add(1, Ordering::SeqCst);
            true
        });

        for n in 0..100u32 {
            q.post(n);
        }
        q.wait(true);
        assert!(count.load(Ordering::SeqCst) < 100);
        assert!(q.is_empty());
    }

    #[test]
    fn post_fails_when_idle() {
        let q = WorkQueue::idle(|_: &u32| true);
        assert!(!q.post(1));
        assert!(q.start());
        assert!(q.post(1));
        q.wait(false);
        // Worker exited back to Idle.
        assert!(!q.post(2));
    }

    #[test]
    fn lifecycle_methods_are_idempotent_outside_run() {
        let q = WorkQueue::idle(|_: &u32| true);
        assert!(!q.stop());
        assert!(!q.abort());
        assert!(!q.notify());
        assert!(!q.wait(false));
    }

    #[test]
    fn prompt_mode_runs_on_caller_thread() {
        let caller = std::thread::current().id();
        let q = WorkQueue::idle(move |_: &u32| std::thread::current().id() == caller);

        assert!(q.enable_prompt_execution());
        // Result is the callback's own return value.
        assert!(q.post(1));
        assert_eq!(q.size(), 0);

        assert!(!q.enable_prompt_execution());
        assert!(q.disable_prompt_execution());
        assert!(!q.disable_prompt_execution());
    }

    #[test]
    fn prompt_requires_idle_and_empty() {
        let q = WorkQueue::new(|_: &u32| true);
        // Running, not Idle.
        assert!(!q.enable_prompt_execution());
    }

    #[test]
    fn start_requires_idle() {
        let q = WorkQueue::new(|_: &u32| true);
        assert!(!q.start());
    }
}
