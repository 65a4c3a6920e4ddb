//! Subscriber registry implementation

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;

use super::subscriber::{Subscriber, SubscriberId};

/// Set of live subscribers
///
/// Every mutation and every full-set iteration goes through one mutex, so
/// the set is never observed half-updated. Iteration works on a snapshot:
/// a subscriber added or removed while a round is in flight is either fully
/// part of that round or not at all.
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh subscriber id
    pub fn next_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a subscriber.
    ///
    /// Adding an id that is already present replaces the previous entry.
    pub async fn add(&self, subscriber: Arc<Subscriber>) {
        let mut subscribers = self.subscribers.lock().await;
        let id = subscriber.id();
        let peer = subscriber.peer_addr();

        if subscribers.insert(id, subscriber).is_some() {
            tracing::debug!(subscriber_id = id, "Subscriber replaced");
        }

        tracing::info!(
            subscriber_id = id,
            peer = %peer,
            subscribers = subscribers.len(),
            "Subscriber added"
        );
    }

    /// Remove a subscriber, returning it if it was present.
    ///
    /// Does not close the connection; callers decide whether to.
    pub async fn remove(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(&id);

        if removed.is_some() {
            tracing::debug!(
                subscriber_id = id,
                subscribers = subscribers.len(),
                "Subscriber removed"
            );
        }

        removed
    }

    /// Snapshot of the current subscribers, ordered by id
    pub async fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        let subscribers = self.subscribers.lock().await;
        let mut snapshot: Vec<_> = subscribers.values().cloned().collect();
        snapshot.sort_by_key(|s| s.id());
        snapshot
    }

    /// Run `f` once for every subscriber in a snapshot taken under the lock.
    ///
    /// The futures run concurrently and the call returns once all of them
    /// have finished, with their outputs in id order.
    pub async fn for_each<F, Fut>(&self, f: F) -> Vec<Fut::Output>
    where
        F: FnMut(Arc<Subscriber>) -> Fut,
        Fut: Future,
    {
        let snapshot = self.snapshot().await;
        join_all(snapshot.into_iter().map(f)).await
    }

    /// Ids of the current subscribers, sorted
    pub async fn ids(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<_> = self.subscribers.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.lock().await.is_empty()
    }

    /// Remove and close every subscriber.
    ///
    /// Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut subscribers = self.subscribers.lock().await;
            subscribers.drain().map(|(_, s)| s).collect()
        };

        let count = drained.len();
        join_all(drained.iter().map(|s| s.close())).await;

        if count > 0 {
            tracing::info!(closed = count, "All subscribers closed");
        }

        count
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn subscriber(registry: &SubscriberRegistry) -> (Arc<Subscriber>, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(1024);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        let sub = Subscriber::new(registry.next_id(), addr, writer, CancellationToken::new());
        (Arc::new(sub), reader)
    }

    #[tokio::test]
    async fn test_add_remove() {
        let registry = SubscriberRegistry::new();
        let (sub, _rx) = subscriber(&registry);
        let id = sub.id();

        registry.add(sub).await;
        assert!(registry.contains(id).await);
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(id).await.is_some());
        assert!(registry.is_empty().await);

        // Removing again is a no-op
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn test_add_twice_does_not_duplicate() {
        let registry = SubscriberRegistry::new();
        let (sub, _rx) = subscriber(&registry);

        registry.add(Arc::clone(&sub)).await;
        registry.add(Arc::clone(&sub)).await;

        let visits = registry.for_each(|s| async move { s.id() }).await;
        assert_eq!(visits, vec![sub.id()]);
    }

    #[tokio::test]
    async fn test_for_each_visits_in_id_order() {
        let registry = SubscriberRegistry::new();
        let mut readers = Vec::new();
        for _ in 0..5 {
            let (sub, rx) = subscriber(&registry);
            registry.add(sub).await;
            readers.push(rx);
        }

        let ids = registry.for_each(|s| async move { s.id() }).await;
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        registry.remove(3).await;
        assert_eq!(registry.ids().await, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_removed_subscriber_not_visited() {
        let registry = SubscriberRegistry::new();
        let (a, _ra) = subscriber(&registry);
        let (b, mut rb) = subscriber(&registry);
        let a_id = a.id();
        registry.add(a).await;
        registry.add(b).await;

        registry.remove(a_id).await;

        let results = registry
            .for_each(|s| async move { s.write_chunk(b"X", Duration::from_secs(1)).await.is_ok() })
            .await;
        assert_eq!(results, vec![true]);

        let mut buf = [0u8; 1];
        rb.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"X");
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_with_rounds() {
        let registry = Arc::new(SubscriberRegistry::new());
        let seen_removed = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let seen_removed = Arc::clone(&seen_removed);
            handles.push(tokio::spawn(async move {
                let (sub, _rx) = subscriber(&registry);
                let id = sub.id();
                registry.add(sub).await;

                // Added before this round started: must be visited
                let ids = registry.for_each(|s| async move { s.id() }).await;
                assert!(ids.contains(&id));

                registry.remove(id).await;

                // Removed before this round started: must not be visited
                let ids = registry.for_each(|s| async move { s.id() }).await;
                if ids.contains(&id) {
                    seen_removed.lock().unwrap().push(id);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(seen_removed.lock().unwrap().is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SubscriberRegistry::new();
        let (a, mut ra) = subscriber(&registry);
        let (b, mut rb) = subscriber(&registry);
        registry.add(Arc::clone(&a)).await;
        registry.add(Arc::clone(&b)).await;

        assert_eq!(registry.close_all().await, 2);
        assert!(registry.is_empty().await);
        assert!(a.is_closed() && b.is_closed());

        let mut buf = Vec::new();
        assert_eq!(ra.read_to_end(&mut buf).await.unwrap(), 0);
        assert_eq!(rb.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
