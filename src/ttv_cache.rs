// Response cache for upstream nearby-routes payloads.
//
// One owned component, two maps: a value cache with per-entry expiry and an
// in-flight map used only for request coalescing. TTL selection depends on
// the payload's freshness: real-time predictions go stale within seconds,
// static timetable data holds for minutes. A periodic sweep evicts expired
// entries and enforces a bounded size in insertion order. Callers never
// touch the maps directly; everything goes through fetch/get/set/clear.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::ttv_models::{Result, RoutesPayload};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<RoutesPayload>>>>;

/// Whether a cached payload contains live predictions or only static
/// schedule data. Drives TTL selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Realtime,
    Schedule,
}

struct CacheEntry {
    payload: Arc<RoutesPayload>,
    seq: u64,
    expires_at: Instant,
    freshness: Freshness,
}

pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    pending: Mutex<HashMap<String, SharedFetch>>,
    realtime_ttl: Duration,
    schedule_ttl: Duration,
    max_entries: usize,
    seq: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ResponseCache {
    pub fn new(realtime_ttl: Duration, schedule_ttl: Duration, max_entries: usize) -> Self {
        ResponseCache {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            realtime_ttl,
            schedule_ttl,
            max_entries,
            seq: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// Fetch through the cache. A live cached value is returned immediately;
    /// a key with a request already in flight joins that request rather than
    /// issuing a second upstream call (and shares its failure, if it fails);
    /// otherwise the producer runs, and its result is cached on success with
    /// a freshness-dependent TTL. The in-flight registration is removed once
    /// settled, success or failure, so a later caller can retry.
    pub async fn fetch<F, Fut>(self: &Arc<Self>, key: &str, producer: F) -> Result<Arc<RoutesPayload>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RoutesPayload>> + Send + 'static,
    {
        if let Some(hit) = self.get(key) {
            debug!("cache hit for {key}");
            return Ok(hit);
        }

        let fut = {
            let mut pending = self.pending.lock().unwrap();
            if let Some(inflight) = pending.get(key) {
                debug!("joining in-flight request for {key}");
                inflight.clone()
            } else {
                debug!("cache miss for {key}, fetching upstream");
                let cache = Arc::clone(self);
                let owned_key = key.to_string();
                let fut: SharedFetch = async move {
                    let result = producer().await.map(Arc::new);
                    match &result {
                        Ok(payload) => cache.store(&owned_key, Arc::clone(payload)),
                        Err(err) => warn!("upstream fetch failed for {owned_key}: {err}"),
                    }
                    cache.pending.lock().unwrap().remove(&owned_key);
                    result
                }
                .boxed()
                .shared();
                pending.insert(key.to_string(), fut.clone());
                fut
            }
        };

        fut.await
    }

    /// Look up a live entry. Expired entries are removed on read.
    pub fn get(&self, key: &str) -> Option<Arc<RoutesPayload>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => {
                debug!("serving {key} from a {:?} entry", entry.freshness);
                Some(Arc::clone(&entry.payload))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a payload under the TTL matching its freshness tag.
    pub fn set(&self, key: &str, payload: Arc<RoutesPayload>, freshness: Freshness) {
        let ttl = match freshness {
            Freshness::Realtime => self.realtime_ttl,
            Freshness::Schedule => self.schedule_ttl,
        };
        let entry = CacheEntry {
            payload,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            expires_at: Instant::now() + ttl,
            freshness,
        };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }

    fn store(&self, key: &str, payload: Arc<RoutesPayload>) {
        let freshness = if has_realtime_data(&payload) {
            Freshness::Realtime
        } else {
            Freshness::Schedule
        };
        debug!("caching {key} as {freshness:?}");
        self.set(key, payload, freshness);
    }

    /// Drop expired entries, then enforce the size bound by evicting the
    /// oldest-inserted entries. Also runs from the background sweeper.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries.retain(|_, entry| now <= entry.expires_at);

        if entries.len() > self.max_entries {
            let mut by_age: Vec<(String, u64)> = entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.seq))
                .collect();
            by_age.sort_by_key(|(_, seq)| *seq);
            let excess = entries.len() - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                debug!("evicting {key} to stay under {} entries", self.max_entries);
                entries.remove(&key);
            }
        }
    }

    /// Start the periodic sweep. Holds only a weak reference so a dropped
    /// cache also stops its sweeper.
    pub fn start(self: &Arc<Self>, every: Duration) {
        let mut sweeper = self.sweeper.lock().unwrap();
        if sweeper.is_some() {
            warn!("cache sweeper already running");
            return;
        }
        let weak: Weak<ResponseCache> = Arc::downgrade(self);
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(cache) => cache.sweep(),
                    None => break,
                }
            }
        }));
    }

    /// Cancel the background sweep, if running.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Synchronous teardown: cancel the sweeper and empty both maps. Used
    /// for graceful shutdown and tests.
    pub fn clear(&self) {
        self.stop();
        self.entries.lock().unwrap().clear();
        self.pending.lock().unwrap().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[cfg(test)]
    fn freshness_of(&self, key: &str) -> Option<Freshness> {
        self.entries.lock().unwrap().get(key).map(|entry| entry.freshness)
    }
}

// ============================================================================
// Freshness Classification and Cache Keys
// ============================================================================

/// True if any schedule item anywhere in the payload carries a real-time
/// prediction.
pub fn has_realtime_data(payload: &RoutesPayload) -> bool {
    payload
        .routes
        .iter()
        .flat_map(|route| route.itineraries.iter())
        .flat_map(|itinerary| itinerary.schedule_items.iter())
        .any(|item| item.is_real_time)
}

/// Deterministic key: endpoint plus the query parameters sorted by name.
pub fn cache_key(endpoint: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by_key(|(name, _)| *name);
    let query: Vec<String> = sorted
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("{}?{}", endpoint, query.join("&"))
}

/// Coordinates are rounded to 4 decimal places (~11 m) so near-duplicate
/// requests (GPS drift, pin nudges) collapse onto one key.
pub fn round_coord(value: f64) -> String {
    format!("{value:.4}")
}

pub fn nearby_cache_key(lat: f64, lon: f64, max_distance: u32) -> String {
    cache_key(
        "nearby_routes",
        &[
            ("lat", round_coord(lat)),
            ("lon", round_coord(lon)),
            ("max_distance", max_distance.to_string()),
        ],
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ttv_models::{Itinerary, Route, ScheduleItem, TtvError};
    use std::sync::atomic::AtomicUsize;

    fn payload(realtime: bool) -> RoutesPayload {
        RoutesPayload {
            routes: vec![Route {
                global_route_id: "R1".into(),
                itineraries: vec![Itinerary {
                    schedule_items: vec![ScheduleItem {
                        departure_time: 1_700_000_000,
                        is_real_time: realtime,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    fn cache(realtime_ms: u64, schedule_ms: u64, max: usize) -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(
            Duration::from_millis(realtime_ms),
            Duration::from_millis(schedule_ms),
            max,
        ))
    }

    #[tokio::test]
    async fn concurrent_fetches_invoke_the_producer_once() {
        let cache = cache(5_000, 120_000, 100);
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(payload(false))
            }
        };

        let (a, b) = tokio::join!(
            cache.fetch("K", producer(Arc::clone(&calls))),
            cache.fetch("K", producer(Arc::clone(&calls))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn coalesced_failure_reaches_every_waiter_and_is_not_cached() {
        let cache = cache(5_000, 120_000, 100);
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err::<RoutesPayload, _>(TtvError::Timeout)
            }
        };

        let (a, b) = tokio::join!(
            cache.fetch("K", failing(Arc::clone(&calls))),
            cache.fetch("K", failing(Arc::clone(&calls))),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap_err(), TtvError::Timeout);
        assert_eq!(b.unwrap_err(), TtvError::Timeout);
        assert!(cache.get("K").is_none());

        // A caller arriving after the failure settled triggers a new attempt.
        let result = cache
            .fetch("K", failing(Arc::clone(&calls)))
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn realtime_payloads_expire_on_the_short_ttl() {
        let cache = cache(20, 60_000, 100);
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(payload(true))
            }
        };

        cache.fetch("K", producer(Arc::clone(&calls))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Within the realtime TTL: served from cache.
        cache.fetch("K", producer(Arc::clone(&calls))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.fetch("K", producer(Arc::clone(&calls))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn schedule_payloads_use_the_long_ttl() {
        let cache = cache(20, 60_000, 100);
        let calls = Arc::new(AtomicUsize::new(0));

        let producer = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(payload(false))
            }
        };

        cache.fetch("K", producer(Arc::clone(&calls))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Well past the realtime TTL, still inside the schedule TTL.
        cache.fetch("K", producer(Arc::clone(&calls))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classification_finds_realtime_items_anywhere() {
        assert!(has_realtime_data(&payload(true)));
        assert!(!has_realtime_data(&payload(false)));
        assert!(!has_realtime_data(&RoutesPayload::default()));
    }

    #[tokio::test]
    async fn fetched_entries_carry_the_matching_freshness_tag() {
        let cache = cache(5_000, 120_000, 100);
        cache.fetch("rt", || async { Ok(payload(true)) }).await.unwrap();
        cache.fetch("sched", || async { Ok(payload(false)) }).await.unwrap();

        assert_eq!(cache.freshness_of("rt"), Some(Freshness::Realtime));
        assert_eq!(cache.freshness_of("sched"), Some(Freshness::Schedule));
    }

    #[tokio::test]
    async fn sweep_drops_expired_and_enforces_the_size_bound() {
        let cache = cache(10, 10, 3);
        for i in 0..3 {
            cache.set(&format!("expired-{i}"), Arc::new(payload(false)), Freshness::Schedule);
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.set("live-0", Arc::new(payload(false)), Freshness::Realtime);
        assert_eq!(cache.len(), 4);

        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("live-0").is_some());
    }

    #[test]
    fn sweep_evicts_oldest_inserted_beyond_the_limit() {
        let cache = ResponseCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
            2,
        );
        cache.set("first", Arc::new(payload(false)), Freshness::Schedule);
        cache.set("second", Arc::new(payload(false)), Freshness::Schedule);
        cache.set("third", Arc::new(payload(false)), Freshness::Schedule);

        cache.sweep();
        assert!(cache.get("first").is_none());
        assert!(cache.get("second").is_some());
        assert!(cache.get("third").is_some());
    }

    #[tokio::test]
    async fn clear_empties_the_cache_and_stops_the_sweeper() {
        let cache = cache(5_000, 120_000, 100);
        cache.start(Duration::from_millis(10));
        cache.set("K", Arc::new(payload(false)), Freshness::Schedule);

        cache.clear();
        assert!(cache.get("K").is_none());
        assert!(cache.sweeper.lock().unwrap().is_none());
    }

    #[test]
    fn cache_keys_sort_params_and_round_coordinates() {
        let key = nearby_cache_key(45.501_699_9, -73.567_312, 500);
        assert_eq!(key, "nearby_routes?lat=45.5017&lon=-73.5673&max_distance=500");

        // Near-duplicate coordinates collapse onto the same key.
        assert_eq!(key, nearby_cache_key(45.501_74, -73.567_29, 500));
    }
}
