use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{Query, StoredDocument};

pub type Snapshot = Vec<StoredDocument>;

struct Subscriber {
    query: Query,
    sender: watch::Sender<Snapshot>,
}

/// Live queries currently registered against a store.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a live query whose current result is `initial`.
    pub fn register(self: &Arc<Self>, query: Query, initial: Snapshot) -> Subscription {
        let (sender, receiver) = watch::channel(initial);
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        tracing::debug!(id, collection = %query.collection, "subscription registered");
        inner.subscribers.insert(id, Subscriber { query, sender });

        Subscription {
            id,
            registry: Arc::clone(self),
            stream: Box::pin(WatchStream::new(receiver)),
        }
    }

    /// Queries that need re-running after a write to `collection`.
    pub fn watching(&self, collection: &str) -> Vec<(u64, Query)> {
        self.lock()
            .subscribers
            .iter()
            .filter(|(_, s)| s.query.collection == collection)
            .map(|(id, s)| (*id, s.query.clone()))
            .collect()
    }

    /// Every registered query.
    pub fn all(&self) -> Vec<(u64, Query)> {
        self.lock()
            .subscribers
            .iter()
            .map(|(id, s)| (*id, s.query.clone()))
            .collect()
    }

    /// Push a fresh snapshot to one subscriber. Snapshots equal to the last
    /// one pushed are dropped, as are subscribers cancelled in the meantime.
    pub fn publish(&self, id: u64, snapshot: Snapshot) {
        if let Some(subscriber) = self.lock().subscribers.get(&id) {
            subscriber.sender.send_if_modified(|current| {
                if *current == snapshot {
                    return false;
                }
                *current = snapshot;
                true
            });
        }
    }

    fn unregister(&self, id: u64) {
        if self.lock().subscribers.remove(&id).is_some() {
            tracing::debug!(id, "subscription cancelled");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a live query. Dropping it tears the subscription down.
pub struct Subscription {
    id: u64,
    registry: Arc<SubscriberRegistry>,
    stream: Pin<Box<WatchStream<Snapshot>>>,
}

impl Subscription {
    /// Wait for the next snapshot. The first call returns immediately with
    /// the snapshot taken at subscribe time; intermediate snapshots may be
    /// skipped, the latest one always wins.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.stream.next().await
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
