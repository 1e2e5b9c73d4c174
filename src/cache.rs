//! Read-through cache of per-unit onsite results
//!
//! Keys are (process, pathway, output). Each key gets its own slot mutex:
//! the first caller computes while holding the slot, later callers for the
//! same key block on it and then share the stored `Arc`. The outer map lock
//! is only held long enough to find or create a slot, so different keys
//! compute concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::error::Result;
use crate::onsite::OnsiteResults;
use crate::process::{PathwayRef, ProcessRef};

/// (process, pathway, output)
pub type CacheKey = (ProcessRef, PathwayRef, String);

type Slot = Arc<Mutex<Option<Arc<OnsiteResults>>>>;

/// Onsite results shared by every solve in one session.
#[derive(Debug, Default)]
pub struct OnsiteCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl OnsiteCache {
    /// An empty cache.
    pub fn new() -> Self {
        OnsiteCache::default()
    }

    fn slot(&self, key: CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }

    /// Returns the cached results for `key`, computing them with `compute`
    /// on first use. Errors are not cached.
    pub fn get_or_compute(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<OnsiteResults>,
    ) -> Result<Arc<OnsiteResults>> {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(r) = guard.as_ref() {
            return Ok(Arc::clone(r));
        }
        let r = Arc::new(compute()?);
        *guard = Some(Arc::clone(&r));
        Ok(r)
    }

    /// Drops every entry. Call after the underlying data changes.
    pub fn reset(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(entries = slots.len(), "resetting onsite cache");
        slots.clear();
    }

    /// Number of keys with computed results.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// True when nothing has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::LcaError;

    fn key(id: &str) -> CacheKey {
        (ProcessRef::Stationary(id.into()), PathwayRef::Mix, "O1".into())
    }

    #[test]
    fn test_second_call_returns_cached_value() {
        let cache = OnsiteCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(OnsiteResults::new())
        };
        let a = cache.get_or_compute(key("P1"), compute).unwrap();
        let b = cache.get_or_compute(key("P1"), compute).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        cache.reset();
        assert!(cache.is_empty());
        cache.get_or_compute(key("P1"), compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = OnsiteCache::new();
        let failed = cache.get_or_compute(key("P1"), || Err(LcaError::InvalidConfig("boom".into())));
        assert!(failed.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_compute(key("P1"), || Ok(OnsiteResults::new())).is_ok());
    }

    #[test]
    fn test_concurrent_callers_compute_once() {
        let cache = OnsiteCache::new();
        let calls = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    cache
                        .get_or_compute(key("P1"), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(OnsiteResults::new())
                        })
                        .unwrap();
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
