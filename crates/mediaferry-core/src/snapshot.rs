//! Workflow snapshots: the persistence boundary of a composer.
//!
//! A snapshot keeps only light scalar fields (topic, tone, caption text,
//! cursor index, ...) so the durable store never fills up with image
//! payloads. Any text field that is an inline data URI or is larger than
//! [`SnapshotLimits::max_field_bytes`] is dropped whole and recorded by
//! name in [`WorkflowSnapshot::excluded`]; it is never truncated.
//!
//! Persistence is best-effort: a quota failure clears the store and
//! retries once, a second failure is logged and swallowed. Restoring
//! treats unparsable or oversized stored values as corrupted legacy data,
//! deletes them and reports nothing to restore.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, WriteOutcome, write_with_retry};
use crate::types::is_inline_ref;

/// Size limits applied when capturing and restoring snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLimits {
    /// Largest text field (in bytes) kept in a snapshot.
    pub max_field_bytes: usize,
    /// Largest serialized snapshot (in bytes) accepted from the store.
    pub max_snapshot_bytes: usize,
}

impl SnapshotLimits {
    /// Default for [`max_field_bytes`](Self::max_field_bytes): 8 KiB.
    pub const DEFAULT_MAX_FIELD_BYTES: usize = 8 * 1024;
    /// Default for [`max_snapshot_bytes`](Self::max_snapshot_bytes): 64 KiB.
    pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 64 * 1024;
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_field_bytes: Self::DEFAULT_MAX_FIELD_BYTES,
            max_snapshot_bytes: Self::DEFAULT_MAX_SNAPSHOT_BYTES,
        }
    }
}

/// A primitive field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean flag (e.g. whether a panel is open).
    Flag(bool),
    /// Whole number (e.g. a cursor index).
    Integer(i64),
    /// Fractional number.
    Number(f64),
    /// Text.
    Text(String),
}

impl FieldValue {
    /// Text value, if this is [`FieldValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Boolean value, if this is [`FieldValue::Flag`].
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Integer value, if this is [`FieldValue::Integer`].
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this value is safe to keep under `limits`.
    fn is_light(&self, limits: &SnapshotLimits) -> bool {
        match self {
            Self::Text(text) => !is_inline_ref(text) && text.len() <= limits.max_field_bytes,
            Self::Flag(_) | Self::Integer(_) | Self::Number(_) => true,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// State that can be captured into and restored from a snapshot.
pub trait Snapshottable {
    /// Every persistable field with its current value.
    ///
    /// Large or binary fields may be listed too; capture filters them.
    fn snapshot_fields(&self) -> Vec<(&'static str, FieldValue)>;

    /// Apply the light fields of `snapshot`, leaving everything else as is.
    fn restore_fields(&mut self, snapshot: &WorkflowSnapshot);
}

/// The persistable subset of a composer's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    #[serde(rename = "fields")]
    light_fields: BTreeMap<String, FieldValue>,
    #[serde(rename = "excluded", default)]
    large_fields_excluded: BTreeSet<String>,
}

impl WorkflowSnapshot {
    /// Capture the light fields of `state`.
    #[must_use]
    pub fn capture(state: &impl Snapshottable, limits: &SnapshotLimits) -> Self {
        Self::from_fields(state.snapshot_fields(), limits)
    }

    /// Build a snapshot from `(name, value)` pairs, excluding heavy values.
    #[must_use]
    pub fn from_fields<K: Into<String>>(
        fields: impl IntoIterator<Item = (K, FieldValue)>,
        limits: &SnapshotLimits,
    ) -> Self {
        let mut snapshot = Self::default();
        for (name, value) in fields {
            let name = name.into();
            if value.is_light(limits) {
                snapshot.large_fields_excluded.remove(&name);
                snapshot.light_fields.insert(name, value);
            } else {
                snapshot.light_fields.remove(&name);
                snapshot.large_fields_excluded.insert(name);
            }
        }
        snapshot
    }

    /// Value of a light field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.light_fields.get(name)
    }

    /// Text of a light field.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Flag of a light field.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_flag)
    }

    /// Integer of a light field.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_integer)
    }

    /// All light fields in name order.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.light_fields
    }

    /// Names of fields left out because they were binary or too large.
    #[must_use]
    pub const fn excluded(&self) -> &BTreeSet<String> {
        &self.large_fields_excluded
    }

    /// Returns `true` when no light field was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.light_fields.is_empty()
    }

    /// Drop any light field that should never have been persisted.
    ///
    /// Applied to snapshots read back from storage, which may predate the
    /// current limits or have been written by other code.
    fn sanitize(mut self, limits: &SnapshotLimits) -> Self {
        let heavy: Vec<String> = self
            .light_fields
            .iter()
            .filter(|(_, value)| !value.is_light(limits))
            .map(|(name, _)| name.clone())
            .collect();
        for name in heavy {
            self.light_fields.remove(&name);
            self.large_fields_excluded.insert(name);
        }
        self
    }
}

/// What [`persist`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The value was written.
    Written,
    /// The stored value was already identical; nothing was written.
    Unchanged,
    /// The first write hit the quota; the store was cleared and the retry
    /// succeeded.
    WrittenAfterClear,
    /// The snapshot could not be written and was dropped.
    Dropped,
}

/// Write `snapshot` under `key`.
///
/// Best-effort and never fails: see [`PersistOutcome`] for what happened.
pub fn persist(
    store: &mut impl KeyValueStore,
    key: &str,
    snapshot: &WorkflowSnapshot,
    limits: &SnapshotLimits,
) -> PersistOutcome {
    let json = match serde_json::to_string(snapshot) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(key, "snapshot not persisted: serialization failed: {err}");
            return PersistOutcome::Dropped;
        }
    };
    if json.len() > limits.max_snapshot_bytes {
        tracing::warn!(
            key,
            bytes = json.len(),
            max = limits.max_snapshot_bytes,
            "snapshot not persisted: larger than the restore ceiling"
        );
        return PersistOutcome::Dropped;
    }
    if matches!(store.get(key), Ok(Some(ref existing)) if *existing == json) {
        return PersistOutcome::Unchanged;
    }
    match write_with_retry(store, key, &json) {
        Ok(WriteOutcome::Written) => PersistOutcome::Written,
        Ok(WriteOutcome::WrittenAfterClear) => PersistOutcome::WrittenAfterClear,
        Err(err) => {
            tracing::warn!(key, "snapshot dropped: {err}");
            PersistOutcome::Dropped
        }
    }
}

/// Read the snapshot stored under `key`.
///
/// Returns `None` when nothing is stored, when the store cannot be read,
/// or when the stored value is corrupted or oversized; in the last two
/// cases the stored value is deleted.
pub fn restore(
    store: &mut impl KeyValueStore,
    key: &str,
    limits: &SnapshotLimits,
) -> Option<WorkflowSnapshot> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key, "snapshot not restored: {err}");
            return None;
        }
    };

    if raw.len() > limits.max_snapshot_bytes {
        tracing::warn!(
            key,
            bytes = raw.len(),
            "discarding oversized stored snapshot"
        );
        discard(store, key);
        return None;
    }

    match serde_json::from_str::<WorkflowSnapshot>(&raw) {
        Ok(snapshot) => Some(snapshot.sanitize(limits)),
        Err(err) => {
            tracing::warn!(key, "discarding unparsable stored snapshot: {err}");
            discard(store, key);
            None
        }
    }
}

/// Delete the snapshot under `key`, e.g. when the working state is
/// explicitly cleared.
pub fn clear(store: &mut impl KeyValueStore, key: &str) {
    discard(store, key);
}

fn discard(store: &mut impl KeyValueStore, key: &str) {
    if let Err(err) = store.remove(key) {
        tracing::warn!(key, "could not delete stored snapshot: {err}");
    }
}
