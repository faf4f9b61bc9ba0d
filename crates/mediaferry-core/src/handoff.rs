//! Single-slot hand-off of one image between modules.
//!
//! A source module stages an image for a destination module, the user
//! navigates there (possibly reloading the page), and the destination
//! consumes the staged payload at most once. Each destination has one
//! slot: staging again before the first ticket is consumed replaces it.
//!
//! Tickets expire [`TICKET_TTL_SECS`] after staging. Expiry is checked
//! on every read, so a stale ticket is discarded rather than applied
//! even when the destination is opened directly instead of via hand-off.
//!
//! The editing module hands its result back the same way, by staging a
//! ticket addressed to the original source module.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::clock::Clock;
use crate::store::{KeyValueStore, StoreError, WriteOutcome, write_with_retry};

/// Lifetime of a hand-off ticket (and of a resume record): 10 minutes.
pub const TICKET_TTL_SECS: u64 = 600;

/// Storage key prefix for staged tickets; the destination module id follows.
pub const TICKET_KEY_PREFIX: &str = "mediaferry.handoff.";

/// Errors from staging a ticket.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The staging store rejected the write, even after clearing it.
    #[error("could not stage hand-off: {0}")]
    Store(#[from] StoreError),

    /// The ticket could not be serialized.
    #[error("could not encode hand-off ticket: {0}")]
    Encode(String),
}

/// Opaque identifier of a staged ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// The identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation time plus lifetime, shared by tickets and resume records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    /// Unix milliseconds at creation.
    pub created_at_ms: u64,
    /// Lifetime in seconds.
    pub ttl_seconds: u64,
}

impl Expiry {
    /// A lifetime of [`TICKET_TTL_SECS`] starting at `now_ms`.
    #[must_use]
    pub const fn starting_at(now_ms: u64) -> Self {
        Self {
            created_at_ms: now_ms,
            ttl_seconds: TICKET_TTL_SECS,
        }
    }

    /// Unix milliseconds after which the record is stale.
    #[must_use]
    pub const fn expires_at_ms(self) -> u64 {
        self.created_at_ms
            .saturating_add(self.ttl_seconds.saturating_mul(1000))
    }

    /// Returns `true` once `now_ms` is past the expiry instant.
    ///
    /// A record read exactly at its expiry instant is still valid.
    #[must_use]
    pub const fn is_expired(self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms()
    }
}

/// A staged hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffTicket {
    /// Identifier returned by [`HandoffDesk::stage`].
    pub id: TicketId,
    /// The image being handed over (URL or inline data URI).
    pub image_ref: String,
    /// Module that staged the ticket.
    pub source_module: String,
    /// Module the ticket is addressed to.
    pub dest_module: String,
    /// Free-form context (prompt, platform, ...).
    pub metadata: BTreeMap<String, String>,
    /// When the ticket was staged and how long it lives.
    #[serde(flatten)]
    pub expiry: Expiry,
}

/// What a destination receives from a consumed ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPayload {
    /// Identifier of the consumed ticket.
    pub ticket_id: TicketId,
    /// The handed-over image.
    pub image_ref: String,
    /// Module that staged it.
    pub source_module: String,
    /// Context staged alongside the image.
    pub metadata: BTreeMap<String, String>,
}

impl From<HandoffTicket> for HandoffPayload {
    fn from(ticket: HandoffTicket) -> Self {
        Self {
            ticket_id: ticket.id,
            image_ref: ticket.image_ref,
            source_module: ticket.source_module,
            metadata: ticket.metadata,
        }
    }
}

/// Result of looking up a destination's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A live ticket was found and removed from the slot.
    Applied(HandoffPayload),
    /// A ticket was found but had expired; it was removed unapplied.
    Expired,
    /// The slot was empty (or held unreadable data, now removed).
    Absent,
}

impl ConsumeOutcome {
    /// The payload, if a live ticket was consumed.
    #[must_use]
    pub fn into_payload(self) -> Option<HandoffPayload> {
        match self {
            Self::Applied(payload) => Some(payload),
            Self::Expired | Self::Absent => None,
        }
    }
}

/// Stages and consumes hand-off tickets in a key-value store.
///
/// Tickets may carry inline image payloads, so the store should be a
/// session-scoped staging area rather than the durable store used for
/// workflow snapshots.
#[derive(Debug)]
pub struct HandoffDesk<S, C> {
    staging: S,
    clock: C,
}

impl<S: KeyValueStore, C: Clock> HandoffDesk<S, C> {
    /// Create a desk over `staging`, timing tickets with `clock`.
    pub const fn new(staging: S, clock: C) -> Self {
        Self { staging, clock }
    }

    /// Stage `image_ref` for `dest_module`, replacing any ticket already
    /// waiting there.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Store`] when the ticket cannot be written
    /// even after clearing the staging store.
    pub fn stage(
        &mut self,
        image_ref: &str,
        source_module: &str,
        dest_module: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<TicketId, HandoffError> {
        let now = self.clock.now_millis();
        let ticket = HandoffTicket {
            id: ticket_id(source_module, dest_module, image_ref, now),
            image_ref: image_ref.to_owned(),
            source_module: source_module.to_owned(),
            dest_module: dest_module.to_owned(),
            metadata,
            expiry: Expiry::starting_at(now),
        };
        let json =
            serde_json::to_string(&ticket).map_err(|e| HandoffError::Encode(e.to_string()))?;

        let key = ticket_key(dest_module);
        if matches!(self.staging.get(&key), Ok(Some(_))) {
            tracing::debug!(dest = dest_module, "replacing unconsumed hand-off ticket");
        }
        let outcome = write_with_retry(&mut self.staging, &key, &json)?;
        if outcome == WriteOutcome::WrittenAfterClear {
            tracing::warn!(dest = dest_module, "staging store was cleared to fit hand-off");
        }
        tracing::debug!(
            id = %ticket.id,
            source = source_module,
            dest = dest_module,
            "staged hand-off ticket"
        );
        Ok(ticket.id)
    }

    /// Take the live ticket addressed to `dest_module`, if any.
    ///
    /// Equivalent to [`consume_outcome`](Self::consume_outcome) with
    /// expired and absent slots collapsed into `None`.
    pub fn consume(&mut self, dest_module: &str) -> Option<HandoffPayload> {
        self.consume_outcome(dest_module).into_payload()
    }

    /// Take whatever is in `dest_module`'s slot, reporting why nothing
    /// was applied. The slot is always empty afterwards.
    pub fn consume_outcome(&mut self, dest_module: &str) -> ConsumeOutcome {
        let key = ticket_key(dest_module);
        let Some(ticket) = self.read(&key) else {
            return ConsumeOutcome::Absent;
        };
        self.discard(&key);

        if ticket.expiry.is_expired(self.clock.now_millis()) {
            tracing::warn!(
                id = %ticket.id,
                dest = dest_module,
                "discarding expired hand-off ticket"
            );
            return ConsumeOutcome::Expired;
        }
        tracing::debug!(id = %ticket.id, dest = dest_module, "consumed hand-off ticket");
        ConsumeOutcome::Applied(ticket.into())
    }

    /// Look at the live ticket for `dest_module` without consuming it.
    ///
    /// Expired tickets are not returned (they are left for
    /// [`consume`](Self::consume) to discard).
    #[must_use]
    pub fn peek(&self, dest_module: &str) -> Option<HandoffTicket> {
        let now = self.clock.now_millis();
        self.read_raw(&ticket_key(dest_module))
            .and_then(|raw| serde_json::from_str::<HandoffTicket>(&raw).ok())
            .filter(|ticket| !ticket.expiry.is_expired(now))
    }

    /// The clock used for expiry.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// The underlying staging store.
    pub const fn staging(&self) -> &S {
        &self.staging
    }

    /// Give back the store and clock.
    pub fn into_parts(self) -> (S, C) {
        (self.staging, self.clock)
    }

    fn read(&mut self, key: &str) -> Option<HandoffTicket> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(ticket) => Some(ticket),
            Err(err) => {
                tracing::warn!(key, "discarding unreadable hand-off ticket: {err}");
                self.discard(key);
                None
            }
        }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.staging.get(key) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key, "hand-off slot unreadable: {err}");
                None
            }
        }
    }

    fn discard(&mut self, key: &str) {
        if let Err(err) = self.staging.remove(key) {
            tracing::warn!(key, "could not clear hand-off slot: {err}");
        }
    }
}

/// Storage key of `dest_module`'s slot.
#[must_use]
pub fn ticket_key(dest_module: &str) -> String {
    format!("{TICKET_KEY_PREFIX}{dest_module}")
}

fn ticket_id(source: &str, dest: &str, image_ref: &str, now_ms: u64) -> TicketId {
    let mut hasher = SipHasher13::new();
    hasher.write(source.as_bytes());
    hasher.write_u8(0);
    hasher.write(dest.as_bytes());
    hasher.write_u8(0);
    hasher.write(image_ref.as_bytes());
    hasher.write_u64(now_ms);
    TicketId(format!("{:016x}", hasher.finish()))
}
