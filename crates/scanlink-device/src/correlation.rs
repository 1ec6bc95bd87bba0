//! Correlation of asynchronous device responses with waiting callers.
//!
//! A caller that needs device confirmation [`register`](CorrelationTable::register)s
//! a key and awaits the returned [`PendingOperation`]. Exactly one of three
//! things then completes it:
//!
//! - the response handler [`take`](CorrelationTable::take)s the entry and
//!   resolves or rejects it
//! - the per-entry timer fires and rejects it with `Timeout`
//! - the entry is cancelled (dropped without an answer)
//!
//! Whichever happens first removes the entry, so a late response finds no
//! entry and can never complete an already-failed caller.

use scanlink_core::{Error, Result};
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Entry<T> {
    token: u64,
    tx: oneshot::Sender<Result<T>>,
    timer: JoinHandle<()>,
}

struct Shared<K, T> {
    entries: Mutex<HashMap<K, Entry<T>>>,
    next_token: AtomicU64,
}

/// In-memory map from correlation key to a waiting caller.
///
/// At most one entry exists per key; a second registration is rejected with
/// `Conflict`. Cloning shares the table.
pub struct CorrelationTable<K, T> {
    shared: Arc<Shared<K, T>>,
}

impl<K, T> Clone for CorrelationTable<K, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K, T> Default for CorrelationTable<K, T> {
    fn default() -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }
}

impl<K, T> std::fmt::Debug for CorrelationTable<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.entries().len())
            .finish()
    }
}

impl<K, T> CorrelationTable<K, T> {
    fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<T>>> {
        self.shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of callers currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> CorrelationTable<K, T>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiting caller for `key`, expiring after `timeout`.
    ///
    /// Must be called from within a tokio runtime (the expiry timer is a task).
    ///
    /// # Errors
    /// `Conflict` if an entry for `key` already exists.
    pub fn register(&self, key: K, timeout: Duration) -> Result<PendingOperation<T>> {
        let mut entries = self.entries();
        if entries.contains_key(&key) {
            warn!(key = %key, "Rejected duplicate pending operation");
            return Err(Error::conflict(&key));
        }

        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let table = self.clone();
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            table.expire(&timer_key, token, timeout);
        });

        entries.insert(key.clone(), Entry { token, tx, timer });
        debug!(key = %key, timeout_ms = duration_ms(timeout), "Registered pending operation");

        Ok(PendingOperation {
            rx,
            timeout_ms: duration_ms(timeout),
        })
    }

    /// Claim the entry for `key`, cancelling its timer.
    ///
    /// Returns `None` if no caller is waiting (never registered, already
    /// answered or timed out).
    pub fn take(&self, key: &K) -> Option<Claim<T>> {
        let entry = self.entries().remove(key)?;
        entry.timer.abort();
        Some(Claim { tx: entry.tx })
    }

    /// Resolve the caller waiting on `key`. Returns `false` if there was none.
    pub fn resolve(&self, key: &K, value: T) -> bool {
        self.take(key).is_some_and(|claim| claim.resolve(value))
    }

    /// Reject the caller waiting on `key`. Returns `false` if there was none.
    pub fn reject(&self, key: &K, error: Error) -> bool {
        self.take(key).is_some_and(|claim| claim.reject(error))
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries().contains_key(key)
    }

    fn expire(&self, key: &K, token: u64, timeout: Duration) {
        let mut entries = self.entries();

        // The key may have been answered and re-registered while this timer ran.
        if entries.get(key).is_none_or(|entry| entry.token != token) {
            return;
        }

        if let Some(entry) = entries.remove(key) {
            drop(entries);
            warn!(key = %key, timeout_ms = duration_ms(timeout), "Pending operation timed out");
            let _ = entry.tx.send(Err(Error::timeout(duration_ms(timeout))));
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Exclusive right to answer a claimed entry.
///
/// Dropping a claim without answering completes the waiting caller with a
/// cancellation error.
#[derive(Debug)]
pub struct Claim<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Claim<T> {
    /// Returns `false` if the caller stopped waiting.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Returns `false` if the caller stopped waiting.
    pub fn reject(self, error: Error) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// The caller's side of a registered entry.
#[derive(Debug)]
#[must_use = "a pending operation does nothing unless awaited"]
pub struct PendingOperation<T> {
    rx: oneshot::Receiver<Result<T>>,
    timeout_ms: u64,
}

impl<T> PendingOperation<T> {
    /// Wait for resolution, rejection or timeout.
    ///
    /// # Errors
    /// The rejection error, `Timeout` on expiry, or `Cancelled` if the entry
    /// was dropped without an answer.
    pub async fn wait(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled(format!(
                "no answer within the {}ms window",
                self.timeout_ms
            ))),
        }
    }
}
