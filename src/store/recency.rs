use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

/// In-memory record of uploaded filenames keyed by arrival time
///
/// Arrival keys are microseconds since the Unix epoch. Keys are strictly
/// increasing: an arrival in the same microsecond as (or earlier than) the
/// previous one is moved one microsecond past it, so two uploads never share a key.
///
/// Entries live for the whole server process; there is no eviction.
pub struct RecencyStore {
    inner: Mutex<Arrivals>,
}

#[derive(Default)]
struct Arrivals {
    entries: BTreeMap<i64, String>,
    last_key: Option<i64>,
}

impl RecencyStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Arrivals::default()),
        }
    }

    /// Record an arrival for `filename` at the current time.
    ///
    /// Returns the arrival timestamp in seconds since the epoch.
    pub fn record(&self, filename: &str) -> f64 {
        self.record_at(filename, Utc::now().timestamp_micros())
    }

    fn record_at(&self, filename: &str, now_micros: i64) -> f64 {
        let mut arrivals = self.lock();
        let key = match arrivals.last_key {
            Some(last) if now_micros <= last => last.saturating_add(1),
            _ => now_micros,
        };
        arrivals.last_key = Some(key);
        arrivals.entries.insert(key, filename.to_string());
        micros_to_secs(key)
    }

    /// Filenames recorded strictly after `since` (seconds since the epoch), oldest first.
    ///
    /// The comparison happens on the same `f64` value `record` returns, so
    /// `query(record(name))` never contains that arrival.
    pub fn query(&self, since: f64) -> Vec<String> {
        if since.is_nan() {
            return Vec::new();
        }

        // One microsecond of slack below the cutoff; the exact test is the filter.
        let lower = ((since * 1_000_000.0).floor() as i64).saturating_sub(1);

        let arrivals = self.lock();
        arrivals
            .entries
            .range(lower..)
            .filter(|(key, _)| micros_to_secs(**key) > since)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Number of recorded arrivals
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Arrivals> {
        // Every mutation is a single insert; a panicking holder cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RecencyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn micros_to_secs(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_store() {
        let store = RecencyStore::new();
        assert!(store.is_empty());
        assert!(store.query(0.0).is_empty());
    }

    #[test]
    fn test_query_is_strictly_after() {
        let store = RecencyStore::new();
        let t = store.record("a.txt");

        assert_eq!(store.query(t - 0.000_001), vec!["a.txt".to_string()]);
        assert!(store.query(t).is_empty());
        assert!(store.query(t + 0.000_001).is_empty());
    }

    #[test]
    fn test_query_returns_arrival_order() {
        let store = RecencyStore::new();
        store.record_at("first.jpg", 1_700_000_000_000_000);
        store.record_at("second.jpg", 1_700_000_001_000_000);
        store.record_at("third.jpg", 1_700_000_002_000_000);

        assert_eq!(
            store.query(0.0),
            vec!["first.jpg", "second.jpg", "third.jpg"]
        );
        assert_eq!(store.query(1_700_000_000.5), vec!["second.jpg", "third.jpg"]);
    }

    #[test]
    fn test_same_tick_arrivals_are_both_kept() {
        let store = RecencyStore::new();
        let t1 = store.record_at("a.jpg", 1_700_000_000_000_000);
        let t2 = store.record_at("b.jpg", 1_700_000_000_000_000);
        // Clock stepped backwards
        let t3 = store.record_at("c.jpg", 1_699_999_999_000_000);

        assert!(t1 < t2 && t2 < t3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.query(0.0), vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(store.query(t1), vec!["b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_reupload_is_a_new_arrival() {
        let store = RecencyStore::new();
        let first = store.record_at("a.txt", 1_700_000_000_000_000);
        let second = store.record_at("a.txt", 1_700_000_005_000_000);

        assert_eq!(store.len(), 2);
        assert_eq!(store.query(first - 1.0), vec!["a.txt", "a.txt"]);
        assert_eq!(store.query(first), vec!["a.txt"]);
        assert!(store.query(second).is_empty());
    }

    #[test]
    fn test_query_monotonic_in_cutoff() {
        let store = RecencyStore::new();
        for i in 0..20i64 {
            store.record_at(&format!("f{}.bin", i), 1_700_000_000_000_000 + i * 250_000);
        }

        let cutoffs = [0.0, 1_700_000_000.0, 1_700_000_001.3, 1_700_000_003.75, 1_800_000_000.0];
        for pair in cutoffs.windows(2) {
            let earlier = store.query(pair[0]);
            let later = store.query(pair[1]);
            assert!(later.len() <= earlier.len());
            assert!(later.iter().all(|name| earlier.contains(name)));
        }
    }

    #[test]
    fn test_non_finite_cutoffs() {
        let store = RecencyStore::new();
        store.record("a.txt");

        assert!(store.query(f64::NAN).is_empty());
        assert!(store.query(f64::INFINITY).is_empty());
        assert_eq!(store.query(f64::NEG_INFINITY), vec!["a.txt"]);
        assert_eq!(store.query(-1.0), vec!["a.txt"]);
    }

    #[test]
    fn test_concurrent_record_and_query() {
        let store = Arc::new(RecencyStore::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    store.record(&format!("w{}-{}.jpg", worker, i));
                    let seen = store.query(0.0);
                    assert!(!seen.is_empty());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every arrival got its own key even when recorded in the same microsecond
        assert_eq!(store.len(), 800);
        assert_eq!(store.query(0.0).len(), 800);
    }
}
