use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};

use crate::store::backend::{KvBackend, StorageKey};

/// In-memory backend with fault and latency injection.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<StorageKey, String>>,
    failing_writes: AtomicUsize,
    write_count: AtomicUsize,
    slow_marker: Mutex<Option<(String, Duration)>>,
}

impl MemoryBackend {
    pub fn get(&self, key: StorageKey) -> Option<String> {
        self.entries.lock().unwrap().get(&key).cloned()
    }

    pub fn set(&self, key: StorageKey, value: &str) {
        self.entries.lock().unwrap().insert(key, value.to_string());
    }

    /// The next `count` writes fail without storing anything.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Writes whose value contains `marker` are delayed by `delay`.
    pub fn slow_writes_containing(&self, marker: &str, delay: Duration) {
        *self.slow_marker.lock().unwrap() = Some((marker.to_string(), delay));
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn delay_for(&self, value: &str) -> Option<Duration> {
        self.slow_marker
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(marker, _)| value.contains(marker.as_str()))
            .map(|(_, delay)| *delay)
    }
}

impl KvBackend for MemoryBackend {
    fn read(&self, key: StorageKey) -> impl Future<Output = Result<Option<String>>> + Send {
        let value = self.get(key);
        async move { Ok(value) }
    }

    fn write(&self, key: StorageKey, value: String) -> impl Future<Output = Result<()>> + Send {
        async move {
            if self.take_failure() {
                bail!("simulated write failure for {key}");
            }
            if let Some(delay) = self.delay_for(&value) {
                tokio::time::sleep(delay).await;
            }
            self.entries.lock().unwrap().insert(key, value);
            self.write_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn remove(&self, key: StorageKey) -> impl Future<Output = Result<()>> + Send {
        self.entries.lock().unwrap().remove(&key);
        async { Ok(()) }
    }
}
