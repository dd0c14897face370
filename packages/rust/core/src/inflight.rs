//! Sharing of concurrent identical pipeline runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use webextract_shared::Result;

type Slot<T> = watch::Receiver<Option<Result<T>>>;

/// Registry of runs in progress, keyed by fingerprint.
///
/// The first caller for a key runs the work; callers arriving while it is in
/// progress wait for and receive a clone of its outcome. If the running
/// caller is cancelled, waiters run the work themselves.
pub struct InflightRegistry<T> {
    pending: Mutex<HashMap<String, Slot<T>>>,
}

enum Role<T> {
    Leader(watch::Sender<Option<Result<T>>>),
    Follower(Slot<T>),
}

impl<T: Clone> Default for InflightRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InflightRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys currently in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `work` for `key`, or join the run already in progress.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let role = {
            let mut pending = self.lock();
            match pending.get(key) {
                Some(slot) => Role::Follower(slot.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(key.to_string(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                let _entry = Entry {
                    registry: self,
                    key,
                };
                let outcome = work().await;
                tx.send_replace(Some(outcome.clone()));
                outcome
            }
            Role::Follower(mut slot) => {
                debug!(key, "joining in-flight run");
                if let Ok(settled) = slot.wait_for(Option::is_some).await {
                    if let Some(outcome) = &*settled {
                        return outcome.clone();
                    }
                }
                debug!(key, "in-flight run abandoned, running again");
                work().await
            }
        }
    }
}

/// Removes the leader's key when the run settles or is cancelled.
struct Entry<'a, T> {
    registry: &'a InflightRegistry<T>,
    key: &'a str,
}

impl<T> Drop for Entry<'_, T> {
    fn drop(&mut self) {
        self.registry
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}
