//! Key-value store contract for client-side persistence.
//!
//! Mirrors the browser's `Storage` API: string keys, string values,
//! whole-value writes only. Writers read, modify and write back the
//! full value in one call; there are no field-level updates.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! the CLI. The browser implementation lives in `mediaferry-web`.

use std::collections::BTreeMap;

/// Errors reported by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The write would exceed the store's quota.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The store could not be reached (disabled, private mode, etc.).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A string-keyed, string-valued persistent store.
pub trait KeyValueStore {
    /// Read the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] when the value does not fit.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete the value under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Delete every value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store cannot be written.
    fn clear(&mut self) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

/// How [`write_with_retry`] got the value into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The first write succeeded.
    Written,
    /// The first write hit the quota; the store was cleared and the
    /// retry succeeded.
    WrittenAfterClear,
}

/// Write `value` under `key`, clearing the whole store and retrying once
/// when the quota is exceeded.
///
/// # Errors
///
/// Returns the error of the retry when it fails too, or the first error
/// when it was not a quota failure.
pub fn write_with_retry(
    store: &mut impl KeyValueStore,
    key: &str,
    value: &str,
) -> Result<WriteOutcome, StoreError> {
    match store.set(key, value) {
        Ok(()) => Ok(WriteOutcome::Written),
        Err(StoreError::QuotaExceeded) => {
            tracing::warn!(key, "storage quota exceeded; clearing store and retrying");
            if let Err(err) = store.clear() {
                tracing::warn!(key, "could not clear store: {err}");
            }
            store.set(key, value)?;
            Ok(WriteOutcome::WrittenAfterClear)
        }
        Err(err) => Err(err),
    }
}

/// In-memory store with an optional quota on total stored bytes.
///
/// The quota counts key and value lengths, like browsers do.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// An unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once `quota_bytes` would be exceeded.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(quota) = self.quota_bytes {
            let replaced = self.entries.get(key).map_or(0, |old| key.len() + old.len());
            let after = self.used_bytes() - replaced + key.len() + value.len();
            if after > quota {
                return Err(StoreError::QuotaExceeded);
            }
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.remove("k").unwrap();
    }

    #[test]
    fn quota_counts_keys_and_values() {
        let mut store = MemoryStore::with_quota(10);
        store.set("ab", "cdef").unwrap();
        assert_eq!(store.used_bytes(), 6);
        assert_eq!(store.set("gh", "ijk"), Err(StoreError::QuotaExceeded));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn quota_credits_the_value_being_replaced() {
        let mut store = MemoryStore::with_quota(10);
        store.set("ab", "12345678").unwrap();
        store.set("ab", "87654321").unwrap();
        assert_eq!(store.get("ab").unwrap().as_deref(), Some("87654321"));
    }

    #[test]
    fn clear_frees_quota() {
        let mut store = MemoryStore::with_quota(8);
        store.set("a", "1234567").unwrap();
        assert!(store.set("b", "1").is_err());
        store.clear().unwrap();
        assert!(store.is_empty());
        store.set("b", "1").unwrap();
    }

    #[test]
    fn write_with_retry_clears_on_quota() {
        let mut store = MemoryStore::with_quota(10);
        store.set("old", "123456").unwrap();
        assert_eq!(
            write_with_retry(&mut store, "new", "1234").unwrap(),
            WriteOutcome::WrittenAfterClear
        );
        assert_eq!(store.keys().collect::<Vec<_>>(), ["new"]);
    }

    #[test]
    fn write_with_retry_gives_up_after_one_retry() {
        let mut store = MemoryStore::with_quota(4);
        assert_eq!(
            write_with_retry(&mut store, "key", "too long"),
            Err(StoreError::QuotaExceeded)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn mutable_reference_is_a_store() {
        fn write(mut store: impl KeyValueStore) {
            store.set("x", "y").unwrap();
        }
        let mut store = MemoryStore::new();
        write(&mut store);
        assert_eq!(store.keys().collect::<Vec<_>>(), ["x"]);
    }
}
