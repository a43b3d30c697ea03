//! In-memory pairing code cache with TTL expiry.
//!
//! Codes live for five minutes. Expiry is enforced lazily on read and
//! proactively by a periodic sweep; the sweep reports which numbers it
//! evicted so the caller can delete the matching session directories.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::phone::PhoneNumber;

/// How long a pairing code stays retrievable.
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the background sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Time source for the cache. Injected so expiry is testable without
/// real delays.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A cached pairing code for one phone number.
#[derive(Debug, Clone)]
pub struct PairingEntry {
    /// Display-formatted pairing code (`XXXX-XXXX`).
    pub code: String,
    /// When the code was stored.
    pub created_at: DateTime<Utc>,
}

/// Outcome of a cache lookup. The HTTP layer answers 404 for [`Miss`] and
/// 410 for [`Expired`], so the two must stay distinguishable.
///
/// [`Miss`]: Lookup::Miss
/// [`Expired`]: Lookup::Expired
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(PairingEntry),
    /// An entry existed but outlived the TTL; it was evicted on this read.
    Expired,
    Miss,
}

/// Mapping from normalized phone number to its current pairing code.
///
/// At most one entry per number (`put` overwrites). Entries past the TTL
/// are never returned and are removed either on read or by [`sweep`].
///
/// [`sweep`]: PairingCodeCache::sweep
pub struct PairingCodeCache {
    entries: Arc<RwLock<HashMap<String, PairingEntry>>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl PairingCodeCache {
    /// Create a cache using the wall clock and the default five-minute TTL.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache with an injected time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            ttl: chrono::Duration::from_std(CODE_TTL).unwrap_or(chrono::Duration::minutes(5)),
        }
    }

    /// Override the TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or(self.ttl);
        self
    }

    /// Store a code for a number, replacing any previous entry.
    pub async fn put(&self, number: &PhoneNumber, code: String) {
        let entry = PairingEntry {
            code,
            created_at: self.clock.now(),
        };
        self.entries
            .write()
            .await
            .insert(number.as_str().to_string(), entry);
    }

    /// Look up the current code for a number.
    ///
    /// Returns `None` for unknown numbers and for expired entries; an
    /// expired entry is evicted on the spot.
    pub async fn get(&self, number: &PhoneNumber) -> Option<PairingEntry> {
        match self.lookup(number).await {
            Lookup::Hit(entry) => Some(entry),
            Lookup::Expired | Lookup::Miss => None,
        }
    }

    /// Like [`get`], but tells an expired entry apart from an absent one.
    /// An expired entry is evicted on the spot.
    ///
    /// [`get`]: PairingCodeCache::get
    pub async fn lookup(&self, number: &PhoneNumber) -> Lookup {
        let mut entries = self.entries.write().await;
        match entries.get(number.as_str()) {
            Some(entry) if self.clock.now() - entry.created_at < self.ttl => {
                Lookup::Hit(entry.clone())
            }
            Some(_) => {
                entries.remove(number.as_str());
                Lookup::Expired
            }
            None => Lookup::Miss,
        }
    }

    /// Seconds until the entry expires, floored at zero.
    pub fn expires_in(&self, entry: &PairingEntry) -> i64 {
        let remaining = self.ttl - (self.clock.now() - entry.created_at);
        remaining.num_seconds().max(0)
    }

    /// Drop the entry for a number, if any. Returns whether one existed.
    pub async fn remove(&self, number: &PhoneNumber) -> bool {
        self.entries.write().await.remove(number.as_str()).is_some()
    }

    /// Remove every expired entry and return the evicted numbers.
    ///
    /// Callers delete the session directories associated with the returned
    /// numbers so abandoned attempts never outlive the code TTL on disk.
    pub async fn sweep(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| now - e.created_at >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for number in &expired {
            entries.remove(number);
        }
        expired
    }

    /// Number of live-or-expired entries currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for PairingCodeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use std::sync::Mutex;

    use super::*;

    /// Manually advanced clock for deterministic expiry tests.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    fn number() -> PhoneNumber {
        PhoneNumber::normalize("923027598014").unwrap()
    }

    fn cache_with_manual_clock() -> (PairingCodeCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = PairingCodeCache::with_clock(clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;

        let entry = cache.get(&number()).await.unwrap();
        assert_eq!(entry.code, "1234-5678");
    }

    #[tokio::test]
    async fn test_get_unknown_number() {
        let (cache, _clock) = cache_with_manual_clock();
        assert!(cache.get(&number()).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (cache, _clock) = cache_with_manual_clock();
        cache.put(&number(), "1111-1111".to_string()).await;
        cache.put(&number(), "2222-2222".to_string()).await;

        let entry = cache.get(&number()).await.unwrap();
        assert_eq!(entry.code, "2222-2222");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_entry_retrievable_until_ttl() {
        let (cache, clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;

        clock.advance(CODE_TTL - Duration::from_secs(1));
        assert!(cache.get(&number()).await.is_some());
    }

    #[tokio::test]
    async fn test_entry_expired_at_ttl() {
        let (cache, clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;

        clock.advance(CODE_TTL);
        assert!(cache.get(&number()).await.is_none());
        // The expired entry was evicted on read.
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expires_in_decreases() {
        let (cache, clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;

        let entry = cache.get(&number()).await.unwrap();
        let before = cache.expires_in(&entry);
        clock.advance(Duration::from_secs(30));
        let after = cache.expires_in(&entry);

        assert_eq!(before, 300);
        assert_eq!(after, 270);
    }

    #[tokio::test]
    async fn test_expires_in_floors_at_zero() {
        let (cache, clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;
        let entry = cache.get(&number()).await.unwrap();

        clock.advance(CODE_TTL + Duration::from_secs(60));
        assert_eq!(cache.expires_in(&entry), 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _clock) = cache_with_manual_clock();
        cache.put(&number(), "1234-5678".to_string()).await;

        assert!(cache.remove(&number()).await);
        assert!(!cache.remove(&number()).await);
        assert!(cache.get(&number()).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired() {
        let (cache, clock) = cache_with_manual_clock();
        let old = PhoneNumber::normalize("923027598014").unwrap();
        cache.put(&old, "1111-1111".to_string()).await;

        clock.advance(CODE_TTL);
        let fresh = PhoneNumber::normalize("14155550123").unwrap();
        cache.put(&fresh, "2222-2222".to_string()).await;

        let evicted = cache.sweep().await;
        assert_eq!(evicted, vec!["923027598014".to_string()]);
        assert!(cache.get(&fresh).await.is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_cache() {
        let (cache, _clock) = cache_with_manual_clock();
        assert!(cache.sweep().await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_distinguishes_miss_from_expired() {
        let (cache, clock) = cache_with_manual_clock();
        assert!(matches!(cache.lookup(&number()).await, Lookup::Miss));

        cache.put(&number(), "1234-5678".to_string()).await;
        assert!(matches!(cache.lookup(&number()).await, Lookup::Hit(_)));

        clock.advance(CODE_TTL);
        assert!(matches!(cache.lookup(&number()).await, Lookup::Expired));
        // Evicted on the expired read, so a second lookup is a plain miss.
        assert!(matches!(cache.lookup(&number()).await, Lookup::Miss));
    }
}
