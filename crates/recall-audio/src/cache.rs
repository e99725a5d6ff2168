//! Audio cache and pending-fetch registry.
//!
//! [`AudioCache`] sits between the playback engine and the
//! [`AudioQueryPort`]:
//!
//! - **Cache**: completed payloads keyed by text, bounded by an LRU policy.
//!   Entries are created only when a fetch succeeds with a non-empty
//!   payload. Failures are never cached.
//! - **Pending registry**: at most one in-flight fetch per key. Concurrent
//!   callers for the same key await the same [`Shared`] future and observe
//!   the same payload or the same error.
//!
//! Settlement (store on success, drop the registry entry either way) runs
//! inside the shared future, so it happens exactly once regardless of which
//! waiter ends up driving it.
//!
//! # Locking discipline
//!
//! The state mutex is a std lock: it is only held for map operations and is
//! never held across an `.await` point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use indexmap::IndexMap;
use tokio::task::JoinHandle;

use recall_core::{AudioPayload, AudioQueryPort, TransportError};

use crate::log_key;

type SharedFetch = Shared<BoxFuture<'static, Result<AudioPayload, TransportError>>>;

struct PendingFetch {
    id: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    /// Least recently used first.
    entries: IndexMap<String, AudioPayload>,
    pending: HashMap<String, PendingFetch>,
    /// Bumped by `invalidate`; fetches started under an older epoch do not
    /// repopulate the cache.
    epoch: u64,
    next_fetch_id: u64,
}

impl CacheState {
    /// Look up `key` and mark it most recently used.
    fn touch(&mut self, key: &str) -> Option<AudioPayload> {
        let payload = self.entries.shift_remove(key)?;
        self.entries.insert(key.to_string(), payload.clone());
        Some(payload)
    }

    fn store(&mut self, key: &str, payload: AudioPayload, capacity: usize) {
        self.entries.shift_remove(key);
        self.entries.insert(key.to_string(), payload);
        while self.entries.len() > capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                tracing::debug!(key = %log_key(&evicted), "Evicted least recently used audio");
            }
        }
    }
}

struct CacheInner {
    query: Arc<dyn AudioQueryPort>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A poisoned map is still a consistent map.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(
        &self,
        key: &str,
        fetch_id: u64,
        epoch: u64,
        result: &Result<AudioPayload, TransportError>,
    ) {
        let mut state = self.lock();
        if state.pending.get(key).is_some_and(|p| p.id == fetch_id) {
            state.pending.remove(key);
        }

        match result {
            Ok(payload) if payload.is_empty() => {
                tracing::warn!(key = %log_key(key), "Fetched empty audio payload; not caching");
            }
            Ok(_) if state.epoch != epoch => {
                tracing::debug!(key = %log_key(key), "Cache invalidated during fetch; not caching");
            }
            Ok(payload) => {
                state.store(key, payload.clone(), self.capacity);
                tracing::debug!(
                    key = %log_key(key),
                    bytes = payload.data.len(),
                    cached = state.entries.len(),
                    "Cached audio payload"
                );
            }
            Err(e) => {
                tracing::debug!(key = %log_key(key), error = %e, "Audio fetch failed");
            }
        }
    }
}

/// Deduplicating, LRU-bounded cache of synthesized audio.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone)]
pub struct AudioCache {
    inner: Arc<CacheInner>,
}

impl AudioCache {
    /// Create a cache over `query` holding at most `capacity` payloads.
    pub fn new(query: Arc<dyn AudioQueryPort>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                query,
                capacity: capacity.max(1),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Return the payload for `key`, fetching it at most once.
    ///
    /// 1. Cache hit: returned immediately, no backend call.
    /// 2. Fetch already in flight: awaits that fetch.
    /// 3. Otherwise a new fetch is issued and registered.
    pub async fn get_or_fetch(&self, key: &str) -> Result<AudioPayload, TransportError> {
        let fetch = {
            let mut state = self.inner.lock();
            if let Some(hit) = state.touch(key) {
                tracing::debug!(key = %log_key(key), "Audio cache hit");
                return Ok(hit);
            }
            if let Some(pending) = state.pending.get(key) {
                tracing::debug!(key = %log_key(key), "Joining in-flight audio fetch");
                pending.future.clone()
            } else {
                self.start_fetch(&mut state, key)
            }
        };
        fetch.await
    }

    fn start_fetch(&self, state: &mut CacheState, key: &str) -> SharedFetch {
        state.next_fetch_id += 1;
        let fetch_id = state.next_fetch_id;
        let epoch = state.epoch;
        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();

        tracing::debug!(key = %log_key(key), "Issuing audio fetch");
        let future = async move {
            let result = inner.query.fetch_audio(&owned_key).await;
            inner.settle(&owned_key, fetch_id, epoch, &result);
            result
        }
        .boxed()
        .shared();

        state.pending.insert(
            key.to_string(),
            PendingFetch {
                id: fetch_id,
                future: future.clone(),
            },
        );
        future
    }

    /// Speculatively fetch `key` in the background.
    ///
    /// Never fails: errors are logged and dropped. Same dedup rules as
    /// [`get_or_fetch`](Self::get_or_fetch). Must be called from within a
    /// tokio runtime.
    pub fn warm(&self, key: &str) -> JoinHandle<()> {
        let cache = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = cache.get_or_fetch(&key).await {
                tracing::warn!(key = %log_key(&key), error = %e, "Audio prefetch failed");
            }
        })
    }

    /// Drop every cached payload. In-flight fetches keep running for their
    /// waiters but will not repopulate the cache.
    pub fn invalidate(&self) {
        let mut state = self.inner.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.epoch += 1;
        tracing::info!(dropped, "Audio cache cleared");
    }

    /// Cached payload for `key`, without fetching or touching recency.
    pub fn peek(&self, key: &str) -> Option<AudioPayload> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches currently in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("AudioCache")
            .field("capacity", &self.inner.capacity)
            .field("entries", &state.entries.len())
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures_util::future::join_all;
    use mockall::mock;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_pending, assert_ready_ok};

    use super::*;

    mock! {
        Query {}
        #[async_trait]
        impl AudioQueryPort for Query {
            async fn fetch_audio(&self, key: &str) -> Result<AudioPayload, TransportError>;
        }
    }

    fn mpeg(bytes: &'static [u8]) -> AudioPayload {
        AudioPayload::raw(bytes, "audio/mpeg")
    }

    /// Query port whose fetches block until the test releases the gate.
    struct GatedQuery {
        calls: AtomicUsize,
        gate: Semaphore,
        respond: Box<dyn Fn(&str, usize) -> Result<AudioPayload, TransportError> + Send + Sync>,
    }

    impl GatedQuery {
        fn new(
            respond: impl Fn(&str, usize) -> Result<AudioPayload, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                respond: Box::new(respond),
            })
        }

        fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AudioQueryPort for GatedQuery {
        async fn fetch_audio(&self, key: &str) -> Result<AudioPayload, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.gate
                .acquire()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?
                .forget();
            (self.respond)(key, call)
        }
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let query = GatedQuery::new(|_, _| Ok(mpeg(b"abc")));
        let cache = AudioCache::new(query.clone(), 8);

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_fetch("hello").await })
            })
            .collect();
        tokio::task::yield_now().await;

        assert_eq!(query.calls(), 1);
        assert_eq!(cache.pending_len(), 1);

        query.release(1);
        let results = join_all(waiters).await;
        for result in results {
            assert_eq!(result.unwrap().unwrap(), mpeg(b"abc"));
        }
        assert_eq!(query.calls(), 1);
        assert_eq!(cache.pending_len(), 0);
        assert!(cache.contains("hello"));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_rejection() {
        let query = GatedQuery::new(|_, _| Err(TransportError::Timeout));
        let cache = AudioCache::new(query.clone(), 8);

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_fetch("k").await }
        });
        let second = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_fetch("k").await }
        });
        tokio::task::yield_now().await;
        query.release(1);

        assert_eq!(first.await.unwrap(), Err(TransportError::Timeout));
        assert_eq!(second.await.unwrap(), Err(TransportError::Timeout));
        assert_eq!(query.calls(), 1);
    }

    #[test]
    fn second_waiter_joins_pending_future_without_runtime() {
        let query = GatedQuery::new(|_, _| Ok(mpeg(b"x")));
        let cache = AudioCache::new(query.clone(), 8);

        let mut first = tokio_test::task::spawn(cache.get_or_fetch("k"));
        let mut second = tokio_test::task::spawn(cache.get_or_fetch("k"));
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(query.calls(), 1);

        query.release(1);
        assert!(first.is_woken() || second.is_woken());
        assert_ready_ok!(first.poll());
        assert_ready_ok!(second.poll());
    }

    #[tokio::test]
    async fn failure_is_not_cached_and_retry_refetches() {
        let query = GatedQuery::new(|_, call| {
            if call == 1 {
                Err(TransportError::Unavailable("connection refused".into()))
            } else {
                Ok(mpeg(b"ok"))
            }
        });
        query.release(2);
        let cache = AudioCache::new(query.clone(), 8);

        assert!(cache.get_or_fetch("k").await.is_err());
        assert!(!cache.contains("k"));
        assert_eq!(cache.pending_len(), 0);

        assert_eq!(cache.get_or_fetch("k").await.unwrap(), mpeg(b"ok"));
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test]
    async fn hit_does_not_call_backend_again() {
        let mut query = MockQuery::new();
        query
            .expect_fetch_audio()
            .times(1)
            .returning(|_| Ok(AudioPayload::raw(&b"abc"[..], "audio/mpeg")));
        let cache = AudioCache::new(Arc::new(query), 8);

        cache.get_or_fetch("hello").await.unwrap();
        cache.get_or_fetch("hello").await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn empty_payload_is_returned_but_not_cached() {
        let mut query = MockQuery::new();
        query
            .expect_fetch_audio()
            .times(2)
            .returning(|_| Ok(AudioPayload::raw(Vec::new(), "audio/mpeg")));
        let cache = AudioCache::new(Arc::new(query), 8);

        assert!(cache.get_or_fetch("k").await.unwrap().is_empty());
        assert!(!cache.contains("k"));
        cache.get_or_fetch("k").await.unwrap();
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let mut query = MockQuery::new();
        query
            .expect_fetch_audio()
            .returning(|key| Ok(AudioPayload::raw(key.as_bytes().to_vec(), "audio/mpeg")));
        let cache = AudioCache::new(Arc::new(query), 2);

        cache.get_or_fetch("a").await.unwrap();
        cache.get_or_fetch("b").await.unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get_or_fetch("a").await.unwrap();
        cache.get_or_fetch("c").await.unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn invalidate_clears_and_in_flight_fetch_does_not_repopulate() {
        let query = GatedQuery::new(|key, _| Ok(AudioPayload::raw(key.as_bytes().to_vec(), "audio/mpeg")));
        let cache = AudioCache::new(query.clone(), 8);

        query.release(1);
        cache.get_or_fetch("old").await.unwrap();
        assert!(cache.contains("old"));

        let in_flight = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_fetch("new").await }
        });
        tokio::task::yield_now().await;
        cache.invalidate();
        assert!(cache.is_empty());

        query.release(1);
        // The waiter still gets its payload.
        assert!(in_flight.await.unwrap().is_ok());
        assert!(!cache.contains("new"));
        assert_eq!(cache.pending_len(), 0);
    }

    #[tokio::test]
    async fn warm_swallows_failures_and_fills_on_success() {
        let query = GatedQuery::new(|key, _| {
            if key == "bad" {
                Err(TransportError::Status {
                    code: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(mpeg(b"warm"))
            }
        });
        query.release(2);
        let cache = AudioCache::new(query.clone(), 8);

        cache.warm("bad").await.unwrap();
        cache.warm("good").await.unwrap();

        assert!(!cache.contains("bad"));
        assert_eq!(cache.peek("good"), Some(mpeg(b"warm")));
    }
}
