use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use recordsmith_core::{Record, RecordValue};
use recordsmith_formula::{EvalContext, Formula};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    violated: bool,
    inserted: Instant,
    last_used: u64,
}

/// Shared per-(rule, relevant field values) outcome cache.
///
/// Bounded by `capacity` with least-recently-used eviction; entries older
/// than `ttl` are treated as misses. Concurrent writers of the same key
/// store the same outcome.
#[derive(Debug)]
pub struct EvaluationCache {
    entries: DashMap<String, CacheEntry>,
    /// `(key, tick)` per use, oldest first. A pair is stale once the entry's
    /// `last_used` moved past its tick.
    recency: Mutex<VecDeque<(String, u64)>>,
    capacity: usize,
    ttl: Option<Duration>,
    tick: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for EvaluationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, None)
    }
}

impl EvaluationCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            ttl,
            tick: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let tick = self.next_tick();
        let mut found = None;
        let mut expired = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            if self.is_fresh(&entry) {
                entry.last_used = tick;
                found = Some(entry.violated);
            } else {
                expired = true;
            }
        }

        if let Some(violated) = found {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.touch(key.to_string(), tick);
            return Some(violated);
        }
        if expired {
            self.entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: String, violated: bool) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let tick = self.next_tick();
        let entry = CacheEntry {
            violated,
            inserted: Instant::now(),
            last_used: tick,
        };
        self.entries.insert(key.clone(), entry);
        self.touch(key, tick);
    }

    pub fn get_or_compute(&self, key: String, compute: impl FnOnce() -> bool) -> bool {
        if let Some(violated) = self.get(&key) {
            return violated;
        }
        let violated = compute();
        self.insert(key, violated);
        violated
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let mut recency = self.lock_recency();
        recency.clear();
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted.elapsed() < ttl,
            None => true,
        }
    }

    fn lock_recency(&self) -> std::sync::MutexGuard<'_, VecDeque<(String, u64)>> {
        self.recency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn touch(&self, key: String, tick: u64) {
        let mut recency = self.lock_recency();
        recency.push_back((key, tick));
        if recency.len() > self.capacity.saturating_mul(4).saturating_add(64) {
            let mut live: Vec<(String, u64)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().last_used))
                .collect();
            live.sort_unstable_by_key(|(_, last_used)| *last_used);
            *recency = live.into();
        }
    }

    fn evict_oldest(&self) {
        let mut recency = self.lock_recency();
        while let Some((key, tick)) = recency.pop_front() {
            let current = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.last_used == tick);
            if current {
                self.entries.remove(&key);
                debug!(capacity = self.capacity, "evicted least recently used entry");
                return;
            }
        }
    }
}

/// Cache key: SHA-256 over the object, the rule id and formula source, the
/// evaluation instant and the values of the fields the rule reads.
pub fn cache_key(
    object: &str,
    rule_id: &str,
    formula: &Formula,
    record: &Record,
    ctx: &EvalContext,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(object.to_ascii_lowercase().as_bytes());
    hasher.update([0x1d_u8]);
    hasher.update(rule_id.as_bytes());
    hasher.update([0x1d_u8]);
    hasher.update(formula.source().as_bytes());
    hasher.update([0x1e_u8]);
    hasher.update(ctx.reference.to_string().as_bytes());
    for field in formula.fields() {
        hasher.update([0x1e_u8]);
        hasher.update(field.to_ascii_lowercase().as_bytes());
        hasher.update([0x1f_u8]);
        match lookup(record, field) {
            Some(value) => {
                hasher.update([value_tag(value)]);
                hasher.update(value.to_field_string().as_bytes());
            }
            None => hasher.update([0_u8]),
        }
    }
    hex::encode(hasher.finalize())
}

fn lookup<'a>(record: &'a Record, field: &str) -> Option<&'a RecordValue> {
    record.get(field).or_else(|| {
        record
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    })
}

fn value_tag(value: &RecordValue) -> u8 {
    match value {
        RecordValue::Null => 1,
        RecordValue::Bool(_) => 2,
        RecordValue::Int(_) => 3,
        RecordValue::Decimal(_) => 4,
        RecordValue::Text(_) => 5,
        RecordValue::Date(_) => 6,
        RecordValue::DateTime(_) => 7,
        RecordValue::MultiSelect(_) => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx() -> EvalContext {
        EvalContext::at_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    }

    fn record(pairs: &[(&str, RecordValue)]) -> Record {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn formula(source: &str) -> Formula {
        Formula::parse(source).expect("parse formula")
    }

    #[test]
    fn key_ignores_unrelated_fields() {
        let rule = formula("ISBLANK(Industry)");
        let a = record(&[
            ("Industry", RecordValue::Text("Retail".to_string())),
            ("Name", RecordValue::Text("Acme".to_string())),
        ]);
        let b = record(&[
            ("Industry", RecordValue::Text("Retail".to_string())),
            ("Name", RecordValue::Text("Globex".to_string())),
        ]);
        let c = record(&[("Industry", RecordValue::Null)]);
        let key =
            |rule_id: &str, record: &Record| cache_key("Account", rule_id, &rule, record, &ctx());
        assert_eq!(key("R1", &a), key("R1", &b));
        assert_ne!(key("R1", &a), key("R2", &a));
        assert_ne!(key("R1", &a), key("R1", &c));
    }

    #[test]
    fn key_tracks_formula_source_and_object() {
        let hours = record(&[("Hours", RecordValue::Int(0))]);
        let before = formula("Hours <= 0");
        let after = formula("Hours > 100");
        assert_ne!(
            cache_key("Timesheet", "Hours_Positive", &before, &hours, &ctx()),
            cache_key("Timesheet", "Hours_Positive", &after, &hours, &ctx())
        );
        assert_ne!(
            cache_key("Timesheet", "Hours_Positive", &before, &hours, &ctx()),
            cache_key("Expense", "Hours_Positive", &before, &hours, &ctx())
        );
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = EvaluationCache::new(2, None);
        cache.insert("a".to_string(), true);
        cache.insert("b".to_string(), false);
        assert_eq!(cache.get("a"), Some(true));
        cache.insert("c".to_string(), true);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(true));
        assert_eq!(cache.get("c"), Some(true));
        assert_eq!(cache.hits(), 3);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn expired_entries_miss() {
        let cache = EvaluationCache::new(4, Some(Duration::ZERO));
        cache.insert("a".to_string(), true);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn get_or_compute_runs_once() {
        let cache = EvaluationCache::default();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_compute("k".to_string(), || {
                calls += 1;
                true
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 2);
    }

    #[test]
    fn eviction_skips_stale_recency_pairs() {
        let cache = EvaluationCache::new(3, None);
        for key in ["a", "b", "c"] {
            cache.insert(key.to_string(), true);
        }
        for _ in 0..50 {
            assert_eq!(cache.get("a"), Some(true));
        }
        cache.insert("d".to_string(), false);
        cache.insert("e".to_string(), false);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), Some(true));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), None);
        assert_eq!(cache.get("e"), Some(false));
    }
}
