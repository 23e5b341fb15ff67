//! Single-dispatcher timer wheel.
//!
//! Exposes [`TimerWheel::schedule`] and [`TimerWheel::cancel`]. All due
//! callbacks run sequentially, in insertion order for ties, on one logical
//! task. Resolution is one second: the dispatcher wakes either when the
//! earliest entry becomes due or when a new entry is scheduled that is
//! earlier than the current wake-up.
//!
//! Callbacks must be cheap — they are expected to hand work off to a
//! [`work_queue`]-style bounded queue rather than do it inline.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Opaque handle returned by [`TimerWheel::schedule`], usable with
/// [`TimerWheel::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    at: f64,
    seq: u64,
    token: TimerToken,
    callback: Option<Callback>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest `at` (and, for a
        // tie, the lowest `seq` i.e. insertion order) to surface first, so
        // reverse the comparison.
        other
            .at
            .partial_cmp(&self.at)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Shared {
    heap: Mutex<BinaryHeap<Entry>>,
    cancelled: Mutex<std::collections::HashSet<u64>>,
    notify: Notify,
    next_seq: AtomicU64,
    next_token: AtomicU64,
}

/// A single-dispatcher timer wheel.
///
/// Dropping the `TimerWheel` aborts the dispatcher task; in normal operation
/// the process holds it for its lifetime (see `Runtime` in the `icinga2`
/// binary crate).
pub struct TimerWheel {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

/// Returns the current wall-clock time as fractional seconds since the
/// epoch, matching the `ts` convention used on the wire (spec §4.D/§6).
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

impl TimerWheel {
    /// Start the dispatcher task on the current Tokio runtime.
    pub fn start() -> Self {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            cancelled: Mutex::new(std::collections::HashSet::new()),
            notify: Notify::new(),
            next_seq: AtomicU64::new(0),
            next_token: AtomicU64::new(1),
        });
        let dispatcher = tokio::spawn(dispatch_loop(shared.clone()));
        TimerWheel { shared, dispatcher }
    }

    /// Schedule `callback` to run at absolute time `at` (fractional seconds
    /// since the epoch, see [`now`]). Returns a token usable with
    /// [`cancel`](Self::cancel).
    pub async fn schedule<F>(&self, at: f64, callback: F) -> TimerToken
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.shared.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let token = TimerToken(
            self.shared
                .next_token
                .fetch_add(1, AtomicOrdering::Relaxed),
        );
        {
            let mut heap = self.shared.heap.lock().await;
            heap.push(Entry {
                at,
                seq,
                token,
                callback: Some(Box::new(callback)),
            });
        }
        self.shared.notify.notify_one();
        token
    }

    /// Schedule `callback` to run after `delay` from now.
    pub async fn schedule_after<F>(&self, delay: Duration, callback: F) -> TimerToken
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(now() + delay.as_secs_f64(), callback).await
    }

    /// Cancel a previously scheduled callback. A no-op if it already fired
    /// or was already cancelled.
    pub async fn cancel(&self, token: TimerToken) {
        self.shared.cancelled.lock().await.insert(token.0);
    }

    /// Stop the dispatcher task. Pending callbacks are dropped unrun.
    pub fn shutdown(self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        let sleep_for = {
            let heap = shared.heap.lock().await;
            match heap.peek() {
                Some(entry) => {
                    let delta = entry.at - now();
                    if delta <= 0.0 {
                        Duration::ZERO
                    } else {
                        Duration::from_secs_f64(delta.min(1.0))
                    }
                }
                None => Duration::from_secs(1),
            }
        };

        tokio::select! {
            () = tokio::time::sleep(sleep_for) => {},
            () = shared.notify.notified() => {},
        }

        let now_ts = now();
        let mut due = Vec::new();
        {
            let mut heap = shared.heap.lock().await;
            while let Some(entry) = heap.peek() {
                if entry.at > now_ts {
                    break;
                }
                due.push(heap.pop().expect("peeked Some"));
            }
        }

        if due.is_empty() {
            continue;
        }

        let mut cancelled = shared.cancelled.lock().await;
        for mut entry in due {
            if cancelled.remove(&entry.token.0) {
                trace!(token = entry.token.0, "timer entry cancelled before fire");
                continue;
            }
            if let Some(cb) = entry.callback.take() {
                debug!(token = entry.token.0, at = entry.at, "timer firing");
                cb();
            }
        }
    }
}
