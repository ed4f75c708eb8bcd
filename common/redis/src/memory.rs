use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{Client, CustomRedisError};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// An in-process implementation of [`Client`] with real storage semantics:
/// NX writes lose against live entries, and expired entries surface as
/// `NotFound` exactly like the real client. Used by deterministic tests and
/// local runs without a Redis.
#[derive(Clone, Default)]
pub struct InMemoryRedisClient {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Forces the TTL of `key` to be over, as if its expiry had elapsed.
    /// Lets tests exercise expiry paths without sleeping.
    pub fn expire_now(&self, key: &str) {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() - Duration::from_secs(1));
        }
    }
}

#[async_trait]
impl Client for InMemoryRedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut entries = self.lock_entries();
        let now = Instant::now();
        match entries.get(&k) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(&k);
                Err(CustomRedisError::NotFound)
            }
            Some(entry) => Ok(entry.value.clone()),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set_nx_ex(
        &self,
        k: String,
        v: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        let mut entries = self.lock_entries();
        let now = Instant::now();
        let live = entries.get(&k).is_some_and(|e| !e.is_expired(now));
        if live {
            return Ok(false);
        }
        entries.insert(
            k,
            Entry {
                value: v,
                expires_at: Some(now + Duration::from_secs(seconds)),
            },
        );
        Ok(true)
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut entries = self.lock_entries();
        entries.insert(
            k,
            Entry {
                value: v,
                expires_at: Some(Instant::now() + Duration::from_secs(seconds)),
            },
        );
        Ok(())
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        self.lock_entries().remove(&k);
        Ok(())
    }

    async fn exists(&self, k: String) -> Result<bool, CustomRedisError> {
        let mut entries = self.lock_entries();
        let now = Instant::now();
        match entries.get(&k) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(&k);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}
