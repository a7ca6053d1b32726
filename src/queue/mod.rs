//! A deduplicating, rate-limited FIFO of `namespace/name` keys with single-flight
//! processing. This is the Rust analogue of client-go's `workqueue.RateLimitingInterface`:
//! the same key is never handed to two callers at once, re-adding a key already queued or
//! in flight is a no-op beyond marking it dirty for redelivery, and `add_rate_limited`
//! schedules a future re-add with a per-key exponential backoff.

use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::Duration;
use tokio_util::time::DelayQueue;

/// The base delay of the default exponential rate limiter, matching client-go's
/// `DefaultControllerRateLimiter`.
const BASE_DELAY: Duration = Duration::from_millis(5);
/// The cap on a single key's backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(1000);

/// Canonical `namespace/name` queue key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    pub fn new(namespace: &str, name: &str) -> Key {
        Key(format!("{namespace}/{name}"))
    }

    /// Splits the key back into `(namespace, name)`. Returns `None` for a malformed key
    /// (on a malformed key, the caller should treat this as an error and let it requeue).
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once('/')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Inner {
    queue: VecDeque<Key>,
    /// Keys that are queued (waiting to be handed out) or marked for redelivery while
    /// already in flight.
    dirty: HashSet<Key>,
    /// Keys currently checked out by a `get()` caller.
    processing: HashSet<Key>,
}

/// A rate-limited, deduplicating work queue.
///
/// Cloning a `WorkQueue` is cheap and shares the same underlying state — clone it into
/// each worker task rather than wrapping it in an `Arc` yourself.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    rate_limiter: Arc<Mutex<HashMap<Key, u32>>>,
    shutting_down: Arc<AtomicBool>,
    /// Feeds scheduling requests to the delay pump task, which owns the `DelayQueue`
    /// outright. Entries are never routed through a shared lock: a single slow-to-expire
    /// key must never block another key's `add_rate_limited`/`add_after` call.
    delay_tx: mpsc::UnboundedSender<(Key, Duration)>,
    pump_wake: Arc<Notify>,
}

impl WorkQueue {
    pub fn new(name: &str) -> WorkQueue {
        let (delay_tx, delay_rx) = mpsc::unbounded_channel();
        let queue = WorkQueue {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
            })),
            notify: Arc::new(Notify::new()),
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
            shutting_down: Arc::new(AtomicBool::new(false)),
            delay_tx,
            pump_wake: Arc::new(Notify::new()),
        };
        queue.spawn_delay_pump(name.to_string(), delay_rx);
        queue
    }

    /// Owns the `DelayQueue` exclusively and drains expired entries back into the ready
    /// queue as they come due. Insertions arrive over `delay_tx` rather than a shared
    /// lock, so `add_rate_limited`/`add_after` never block on whichever key currently
    /// has the longest-pending delay.
    fn spawn_delay_pump(&self, name: String, mut rx: mpsc::UnboundedReceiver<(Key, Duration)>) {
        use tracing::Instrument;

        let pump_wake = self.pump_wake.clone();
        let queue = self.clone();
        let pump = async move {
            let mut delayed: DelayQueue<Key> = DelayQueue::new();
            let mut rx_closed = false;

            loop {
                if delayed.is_empty() && (rx_closed || queue.shutting_down.load(Ordering::SeqCst)) {
                    return;
                }

                tokio::select! {
                    maybe_entry = rx.recv(), if !rx_closed => {
                        match maybe_entry {
                            Some((key, delay)) => { delayed.insert(key, delay); }
                            None => rx_closed = true,
                        }
                    }
                    Some(expired) = delayed.next(), if !delayed.is_empty() => {
                        queue.add(expired.into_inner()).await;
                    }
                    _ = pump_wake.notified() => {}
                }
            }
        };
        tokio::spawn(pump.instrument(tracing::debug_span!("workqueue_delay_pump", queue = %name)));
    }

    /// Enqueues `key`. A no-op beyond marking the key dirty if it is already queued or
    /// currently in flight.
    pub async fn add(&self, key: Key) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.dirty.contains(&key) {
            return;
        }
        inner.dirty.insert(key.clone());
        if inner.processing.contains(&key) {
            // Will be re-delivered once `done()` observes it's still dirty.
            return;
        }
        inner.queue.push_back(key);
        drop(inner);
        self.notify.notify_one();
    }

    /// Blocks until a key is available, or returns `None` once the queue is shut down
    /// and drained.
    pub async fn get(&self) -> Option<Key> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if self.shutting_down.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Marks `key` as finished processing. If the key was re-added while in flight, it is
    /// now handed back to the ready queue.
    pub async fn done(&self, key: &Key) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.contains(key) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Resets `key`'s backoff counter.
    pub async fn forget(&self, key: &Key) {
        self.rate_limiter.lock().await.remove(key);
    }

    /// Schedules `key` for re-addition after a per-key exponential delay, and bumps that
    /// key's backoff counter.
    pub async fn add_rate_limited(&self, key: Key) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let delay = {
            let mut attempts = self.rate_limiter.lock().await;
            let count = attempts.entry(key.clone()).or_insert(0);
            let delay = backoff_for(*count);
            *count += 1;
            delay
        };
        let _ = self.delay_tx.send((key, delay));
    }

    /// Schedules `key` for re-addition after a known, fixed delay, without touching its
    /// exponential backoff counter. For errors whose retry interval is known up front
    /// (e.g. "come back once a dependency probably exists") rather than one that should
    /// grow because failures are repeating — see `ErrorWithRequeue`.
    pub async fn add_after(&self, key: Key, delay: Duration) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.delay_tx.send((key, delay));
    }

    /// Shuts the queue down: `get()` drains remaining ready keys, then returns `None`.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.pump_wake.notify_waiters();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }
}

/// Exponential backoff with the same base/cap as client-go's default item rate limiter.
fn backoff_for(attempts: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1u32.checked_shl(attempts).unwrap_or(u32::MAX));
    std::cmp::min(exp, MAX_DELAY)
}
