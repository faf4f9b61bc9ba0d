//! Resume records: the source module's side of a hand-off round trip.
//!
//! Before navigating to an editing module, a composer stores a resume
//! record keyed by its own id. The record holds the light snapshot of the
//! composer plus the index of the image being edited, so the composer can
//! rebuild its view on return whether or not the editor was reached through
//! the hand-off.
//!
//! Records share the ticket lifetime. An expired record means the
//! returning image is unrelated to any pending edit and gets appended.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::handoff::Expiry;
use crate::snapshot::{SnapshotLimits, WorkflowSnapshot};
use crate::store::{KeyValueStore, write_with_retry};

/// Storage key prefix for resume records; the source module id follows.
pub const RESUME_KEY_PREFIX: &str = "mediaferry.resume.";

/// Composer state saved before handing an image to another module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Module that owns the record and expects the image back.
    pub source_module: String,
    /// Module the image was handed to.
    pub dest_module: String,
    /// Light fields of the composer at hand-off time.
    pub snapshot: WorkflowSnapshot,
    /// Index in the media collection of the image being edited.
    pub editing_index: Option<usize>,
    /// When the record was saved and how long it lives.
    #[serde(flatten)]
    pub expiry: Expiry,
}

/// Result of looking up a module's resume record.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeLookup {
    /// A live record was found and removed.
    Valid(ResumeRecord),
    /// A record was found but had expired; it was removed.
    Expired,
    /// No readable record exists.
    Absent,
}

impl ResumeLookup {
    /// The record, if it was still live.
    #[must_use]
    pub fn into_record(self) -> Option<ResumeRecord> {
        match self {
            Self::Valid(record) => Some(record),
            Self::Expired | Self::Absent => None,
        }
    }
}

/// Reads and writes resume records in the durable store.
#[derive(Debug)]
pub struct ResumeLedger<S, C> {
    durable: S,
    clock: C,
    limits: SnapshotLimits,
}

impl<S: KeyValueStore, C: Clock> ResumeLedger<S, C> {
    /// Create a ledger over `durable` with default snapshot limits.
    pub fn new(durable: S, clock: C) -> Self {
        Self::with_limits(durable, clock, SnapshotLimits::default())
    }

    /// Create a ledger that rejects stored records larger than
    /// `limits.max_snapshot_bytes`.
    pub const fn with_limits(durable: S, clock: C, limits: SnapshotLimits) -> Self {
        Self {
            durable,
            clock,
            limits,
        }
    }

    /// Store a resume record for `source_module`, replacing any earlier one.
    ///
    /// Best-effort like snapshot persistence: returns `false` when the
    /// record could not be written, after logging why.
    pub fn save(
        &mut self,
        source_module: &str,
        dest_module: &str,
        snapshot: WorkflowSnapshot,
        editing_index: Option<usize>,
    ) -> bool {
        let record = ResumeRecord {
            source_module: source_module.to_owned(),
            dest_module: dest_module.to_owned(),
            snapshot,
            editing_index,
            expiry: Expiry::starting_at(self.clock.now_millis()),
        };
        self.write(&record)
    }

    /// Store a record taken earlier back under its source module, keeping
    /// its original expiry.
    ///
    /// Used when a return could not be applied yet, so the next attempt
    /// still finds the record. Returns `false` when it could not be written.
    pub fn put_back(&mut self, record: &ResumeRecord) -> bool {
        self.write(record)
    }

    fn write(&mut self, record: &ResumeRecord) -> bool {
        let key = resume_key(&record.source_module);
        let editing_index = record.editing_index;
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(key, "resume record not saved: {err}");
                return false;
            }
        };
        if json.len() > self.limits.max_snapshot_bytes {
            tracing::warn!(key, bytes = json.len(), "resume record too large; not saved");
            return false;
        }
        match write_with_retry(&mut self.durable, &key, &json) {
            Ok(_) => {
                tracing::debug!(key, ?editing_index, "saved resume record");
                true
            }
            Err(err) => {
                tracing::warn!(key, "resume record not saved: {err}");
                false
            }
        }
    }

    /// Remove and return `source_module`'s record, checking its lifetime.
    pub fn take(&mut self, source_module: &str) -> ResumeLookup {
        let key = resume_key(source_module);
        let raw = match self.durable.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ResumeLookup::Absent,
            Err(err) => {
                tracing::warn!(key, "resume record unreadable: {err}");
                return ResumeLookup::Absent;
            }
        };
        self.discard(&key);

        if raw.len() > self.limits.max_snapshot_bytes {
            tracing::warn!(key, bytes = raw.len(), "discarding oversized resume record");
            return ResumeLookup::Absent;
        }
        let record: ResumeRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(key, "discarding unparsable resume record: {err}");
                return ResumeLookup::Absent;
            }
        };
        if record.expiry.is_expired(self.clock.now_millis()) {
            tracing::warn!(key, "discarding expired resume record");
            return ResumeLookup::Expired;
        }
        ResumeLookup::Valid(record)
    }

    /// Whether `source_module` has a stored record (live or not).
    #[must_use]
    pub fn has_record(&self, source_module: &str) -> bool {
        matches!(self.durable.get(&resume_key(source_module)), Ok(Some(_)))
    }

    /// The underlying durable store.
    pub const fn durable(&self) -> &S {
        &self.durable
    }

    fn discard(&mut self, key: &str) {
        if let Err(err) = self.durable.remove(key) {
            tracing::warn!(key, "could not delete resume record: {err}");
        }
    }
}

/// Storage key of `source_module`'s resume record.
#[must_use]
pub fn resume_key(source_module: &str) -> String {
    format!("{RESUME_KEY_PREFIX}{source_module}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::handoff::TICKET_TTL_SECS;
    use crate::snapshot::FieldValue;
    use crate::store::MemoryStore;

    fn snapshot() -> WorkflowSnapshot {
        WorkflowSnapshot::from_fields(
            [
                ("topic", FieldValue::from("product launch")),
                ("platform", FieldValue::from("instagram")),
            ],
            &SnapshotLimits::default(),
        )
    }

    #[test]
    fn save_then_take_within_ttl() {
        let clock = ManualClock::at(10_000);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        assert!(ledger.save("social", "studio", snapshot(), Some(2)));

        clock.advance(Duration::from_secs(120));
        let record = ledger.take("social").into_record().unwrap();
        assert_eq!(record.editing_index, Some(2));
        assert_eq!(record.dest_module, "studio");
        assert_eq!(record.snapshot.text("topic"), Some("product launch"));
        assert!(!ledger.has_record("social"));
        assert_eq!(ledger.take("social"), ResumeLookup::Absent);
    }

    #[test]
    fn take_after_ttl_reports_expired() {
        let clock = ManualClock::at(0);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        ledger.save("social", "studio", snapshot(), Some(0));
        clock.advance(Duration::from_secs(TICKET_TTL_SECS + 1));
        assert_eq!(ledger.take("social"), ResumeLookup::Expired);
        assert!(ledger.durable().is_empty());
    }

    #[test]
    fn put_back_keeps_original_expiry() {
        let clock = ManualClock::at(0);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        ledger.save("social", "studio", snapshot(), Some(3));
        clock.advance(Duration::from_secs(500));
        let record = ledger.take("social").into_record().unwrap();
        assert!(ledger.put_back(&record));

        let again = ledger.take("social").into_record().unwrap();
        assert_eq!(again, record);
        assert_eq!(again.expiry.created_at_ms, 0);

        ledger.put_back(&again);
        clock.advance(Duration::from_secs(TICKET_TTL_SECS - 500 + 1));
        assert_eq!(ledger.take("social"), ResumeLookup::Expired);
    }

    #[test]
    fn records_are_keyed_by_source() {
        let clock = ManualClock::at(0);
        let mut ledger = ResumeLedger::new(MemoryStore::new(), &clock);
        ledger.save("social", "studio", snapshot(), Some(1));
        assert_eq!(ledger.take("blog"), ResumeLookup::Absent);
        assert!(ledger.has_record("social"));
    }

    #[test]
    fn corrupted_record_is_removed() {
        let clock = ManualClock::at(0);
        let mut store = MemoryStore::new();
        store.set(&resume_key("social"), "[1,2").unwrap();
        let mut ledger = ResumeLedger::new(store, &clock);
        assert_eq!(ledger.take("social"), ResumeLookup::Absent);
        assert!(ledger.durable().is_empty());
    }

    #[test]
    fn oversized_record_is_not_saved() {
        let clock = ManualClock::at(0);
        let limits = SnapshotLimits {
            max_snapshot_bytes: 64,
            ..SnapshotLimits::default()
        };
        let mut ledger = ResumeLedger::with_limits(MemoryStore::new(), &clock, limits);
        assert!(!ledger.save("social", "studio", snapshot(), None));
        assert!(ledger.durable().is_empty());
    }
}
