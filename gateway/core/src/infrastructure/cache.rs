// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cache backends for the [`Cache`] port.
//!
//! - [`InMemoryTtlCache`]: bounded LRU with a per-entry expiry.
//! - [`NoopCache`]: never stores anything; every read goes to storage.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use crate::domain::cache::Cache;

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct InMemoryTtlCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl InMemoryTtlCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(cap)) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for InMemoryTtlCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = Entry { value, expires_at: Instant::now() + ttl };
        self.entries.lock().put(key.to_string(), entry);
    }

    async fn invalidate(&self, key: &str) {
        self.entries.lock().pop(key);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) {}

    async fn invalidate(&self, _key: &str) {}
}
