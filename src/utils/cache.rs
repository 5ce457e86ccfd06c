use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use crate::error::{Error, Result};

struct Entry<T> {
    value: Option<(T, Instant)>,
    in_flight: Option<broadcast::Sender<Result<T>>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self { value: None, in_flight: None }
    }
}

/// TTL cache with single-flight semantics: concurrent callers for the same
/// key share one upstream fetch. Failed fetches are never stored; an expired
/// value is left in place so the entry simply retries on the next call.
#[derive(Clone)]
pub struct TtlCache<T> {
    entries: Arc<Mutex<HashMap<String, Entry<T>>>>,
}

impl<T> TtlCache<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Returns the cached value if it is within `ttl`, otherwise joins the
    /// in-flight fetch for `key` or starts one. The fetch runs in a spawned
    /// task so a cancelled caller cannot strand the other waiters.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut rx = {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(key.to_string()).or_default();

            if let Some((value, expires_at)) = &entry.value {
                if Instant::now() < *expires_at {
                    return Ok(value.clone());
                }
            }

            match &entry.in_flight {
                Some(tx) => {
                    debug!("cache: joining in-flight fetch for '{}'", key);
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    entry.in_flight = Some(tx.clone());

                    let entries = Arc::clone(&self.entries);
                    let key = key.to_string();
                    // The fetch gets its own task so a panic inside it
                    // surfaces as an error here instead of stranding waiters.
                    let handle = tokio::spawn(fetch());
                    tokio::spawn(async move {
                        let result = match handle.await {
                            Ok(result) => result,
                            Err(e) => Err(Error::UpstreamUnavailable(format!(
                                "fetch for '{}' aborted: {}",
                                key, e
                            ))),
                        };
                        {
                            let mut entries = entries.lock().await;
                            let entry = entries.entry(key).or_default();
                            entry.in_flight = None;
                            if let Ok(value) = &result {
                                entry.value = Some((value.clone(), Instant::now() + ttl));
                            }
                        }
                        // Waiters all subscribed while the lock marked this
                        // fetch in-flight, so none can miss the send.
                        let _ = tx.send(result);
                    });
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamUnavailable(format!(
                "shared fetch for '{}' was dropped",
                key
            ))),
        }
    }
}

impl<T> Default for TtlCache<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, sleep};
    use tokio_test::assert_ok;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: u64,
    ) -> impl Future<Output = Result<u64>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            Ok(value)
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache: TtlCache<u64> = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("price:WCO", Duration::from_secs(60), move || {
                        counting_fetch(&calls, 100)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 100);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn value_served_within_ttl_and_refetched_after_expiry() {
        let cache: TtlCache<u64> = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let fetch = |calls: &Arc<AtomicUsize>| counting_fetch(calls, 100);

        // t=0: miss, fetches.
        let got = assert_ok!(cache.get_or_fetch("k", ttl, || fetch(&calls)).await);
        assert_eq!(got, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // t=30: hit, no upstream call.
        advance(Duration::from_secs(30)).await;
        let got = cache.get_or_fetch("k", ttl, || fetch(&calls)).await.unwrap();
        assert_eq!(got, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // t=61: expired, fetches again.
        advance(Duration::from_secs(31)).await;
        let got = cache.get_or_fetch("k", ttl, || fetch(&calls)).await.unwrap();
        assert_eq!(got, 100);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached_and_surface_to_all_waiters() {
        let cache: TtlCache<u64> = TtlCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: &Arc<AtomicUsize>| {
            let calls = Arc::clone(calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                Err::<u64, _>(Error::UpstreamUnavailable("boom".into()))
            }
        };

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("k", Duration::from_secs(60), move || failing(&calls))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failure was not stored: the next call goes upstream again.
        let got = cache
            .get_or_fetch("k", Duration::from_secs(60), {
                let calls = Arc::clone(&calls);
                move || counting_fetch(&calls, 7)
            })
            .await
            .unwrap();
        assert_eq!(got, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
