//! Bounded, named, priority-classed FIFO work queue.
//!
//! Mirrors Icinga2's `WorkQueue`: three priority classes (low / normal /
//! high), strict FIFO within a class, a configurable worker count, an
//! exception callback so one bad task doesn't kill a worker, and a
//! `task_rate` stat over a trailing window. Tasks are boxed futures so a
//! queue can front async work (the scheduler's check dispatch, the relay's
//! send path, the replay writer's append path all use one of these).

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Priority class a task is enqueued under. Within a class, order is FIFO.
/// Across classes, `High` drains before `Normal` before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

pub type Task = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

struct Inner {
    name: String,
    capacity: usize,
    lanes: Mutex<[VecDeque<Task>; 3]>,
    len: AtomicU64,
    notify: Notify,
    admit: Semaphore,
    completed_at: Mutex<VecDeque<Instant>>,
    exception_cb: Mutex<Option<Box<dyn Fn(String) + Send + Sync>>>,
}

fn lane_index(p: Priority) -> usize {
    match p {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

/// A bounded FIFO task queue with named identity and 1+ worker tasks.
pub struct WorkQueue {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl std::fmt::Display for QueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work queue is full")
    }
}
impl std::error::Error for QueueFull {}

impl WorkQueue {
    /// Create a named queue with the given bound and start `workers`
    /// worker tasks servicing it. `workers == 1` gives strict FIFO
    /// execution across the whole queue (spec §4.B); `workers > 1` lets
    /// tasks run concurrently with each other.
    pub fn start(name: impl Into<String>, capacity: usize, workers: usize) -> Arc<Self> {
        let inner = Arc::new(Inner {
            name: name.into(),
            capacity,
            lanes: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            len: AtomicU64::new(0),
            notify: Notify::new(),
            admit: Semaphore::new(capacity),
            completed_at: Mutex::new(VecDeque::new()),
            exception_cb: Mutex::new(None),
        });
        let queue = Arc::new(WorkQueue {
            inner: inner.clone(),
            workers: Mutex::new(Vec::new()),
        });
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker_loop(inner.clone(), worker_id)));
        }
        // `try_lock` is safe here: nothing else can hold this mutex before
        // the Arc has been returned to the caller.
        *queue.workers.try_lock().expect("uncontended at construction") = handles;
        queue
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueue `task` under `priority`, waiting for room if the queue is
    /// at capacity.
    pub async fn enqueue<F>(&self, task: F, priority: Priority)
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let permit = self
            .inner
            .admit
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        permit.forget();
        {
            let mut lanes = self.inner.lanes.lock().await;
            lanes[lane_index(priority)].push_back(Box::pin(task));
        }
        self.inner.len.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Non-blocking enqueue; returns [`QueueFull`] immediately if the
    /// queue is at its bound instead of waiting for room.
    pub async fn try_enqueue<F>(&self, task: F, priority: Priority) -> Result<(), QueueFull>
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let permit = self.inner.admit.clone().try_acquire_owned().map_err(|_| QueueFull)?;
        permit.forget();
        {
            let mut lanes = self.inner.lanes.lock().await;
            lanes[lane_index(priority)].push_back(Box::pin(task));
        }
        self.inner.len.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Current number of tasks waiting or in flight.
    pub fn length(&self) -> u64 {
        self.inner.len.load(Ordering::SeqCst)
    }

    /// Tasks completed per second, averaged over the trailing `window`.
    pub async fn task_rate(&self, window: Duration) -> f64 {
        let completed = self.inner.completed_at.lock().await;
        let cutoff = Instant::now() - window;
        let count = completed.iter().filter(|&&t| t >= cutoff).count();
        count as f64 / window.as_secs_f64().max(0.001)
    }

    /// Install a callback invoked with the error string whenever a task
    /// returns `Err` (or panics). Replaces any previous callback.
    pub async fn set_exception_callback<F>(&self, cb: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        *self.inner.exception_cb.lock().await = Some(Box::new(cb));
    }

    /// Abort all worker tasks. Any queued-but-not-started tasks are
    /// dropped without running.
    pub async fn shutdown(&self) {
        for handle in self.workers.lock().await.drain(..) {
            handle.abort();
        }
    }
}

async fn worker_loop(inner: Arc<Inner>, worker_id: usize) {
    loop {
        let task = loop {
            {
                let mut lanes = inner.lanes.lock().await;
                if let Some(t) = lanes.iter_mut().find_map(VecDeque::pop_front) {
                    break t;
                }
            }
            inner.notify.notified().await;
        };

        let result = tokio::spawn(task).await;
        inner.admit.add_permits(1);
        inner.len.fetch_sub(1, Ordering::SeqCst);
        {
            let mut completed = inner.completed_at.lock().await;
            completed.push_back(Instant::now());
            while completed.len() > 10_000 {
                completed.pop_front();
            }
        }

        let error_message = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(join_err) => Some(panic_message(join_err)),
        };
        if let Some(msg) = error_message {
            warn!(queue = %inner.name, worker_id, error = %msg, "task failed");
            if let Some(cb) = inner.exception_cb.lock().await.as_ref() {
                cb(msg);
            } else {
                error!(queue = %inner.name, worker_id, "task failed with no exception callback installed");
            }
        }
    }
}

/// A task that panicked loses its boxed closure to `JoinError`, so the
/// best we can recover is its panic payload downcast to a string.
fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "task cancelled".to_owned();
    }
    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn fifo_within_priority_class_and_high_before_low() {
        // Start with zero workers so both tasks land in their lanes before
        // anything drains, then start a single worker and observe order.
        let queue = WorkQueue::start("test", 16, 0);
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        {
            let mut lanes = queue.inner.lanes.lock().await;
            let o1 = order.clone();
            lanes[lane_index(Priority::Low)].push_back(Box::pin(async move {
                o1.lock().await.push("low");
                Ok(())
            }));
            let o2 = order.clone();
            lanes[lane_index(Priority::High)].push_back(Box::pin(async move {
                o2.lock().await.push("high");
                Ok(())
            }));
        }
        queue.inner.len.store(2, Ordering::SeqCst);
        queue.inner.admit.add_permits(0); // lanes populated directly, bypassing the semaphore
        let handle = tokio::spawn(worker_loop(queue.inner.clone(), 0));
        queue.inner.notify.notify_one();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        handle.abort();

        assert_eq!(*order.lock().await, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn exception_callback_receives_task_errors_and_worker_survives() {
        let queue = WorkQueue::start("errs", 8, 1);
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen2 = seen.clone();
        queue
            .set_exception_callback(move |msg| {
                let seen3 = seen2.clone();
                tokio::spawn(async move {
                    seen3.lock().await.push(msg);
                });
            })
            .await;

        queue
            .enqueue(async { Err("boom".to_owned()) }, Priority::Normal)
            .await;
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        queue
            .enqueue(
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                Priority::Normal,
            )
            .await;

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "worker must survive a failed task");
        assert_eq!(seen.lock().await.as_slice(), &["boom".to_owned()]);
    }

    #[tokio::test]
    async fn try_enqueue_reports_full_queue() {
        let queue = WorkQueue::start("bounded", 1, 0);
        // worker count 0 -> no drain; fill the single slot.
        queue
            .try_enqueue(async { Ok(()) }, Priority::Normal)
            .await
            .expect("first enqueue should succeed");
        let result = queue.try_enqueue(async { Ok(()) }, Priority::Normal).await;
        assert_eq!(result, Err(QueueFull));
    }
}
