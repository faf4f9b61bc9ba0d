//! mediaferry-core: Media hand-off and adaptive framing logic (sans-IO).
//!
//! The engine behind every composer page:
//!
//! - [`ratio`] decides whether an image fits a platform's aspect ratio
//!   and computes a deterministic center crop when it does not;
//!   [`reframe`] applies that crop to encoded image bytes.
//! - [`collection`] keeps the ordered list of images on a page and the
//!   index of the displayed one.
//! - [`handoff`] and [`resume`] carry one image to an editing module and
//!   back across a page navigation, with a fixed ten-minute lifetime.
//! - [`snapshot`] decides which composer fields may be persisted and
//!   restores them while tolerating corrupted stored data.
//! - [`composer`] ties these together behind one explicit state container.
//!
//! This crate has **no I/O dependencies** -- storage is reached through
//! the [`KeyValueStore`] trait and time through the [`Clock`] trait.
//! Browser-backed implementations live in `mediaferry-web`.

pub mod clock;
pub mod collection;
pub mod composer;
pub mod generation;
pub mod handoff;
pub mod library;
pub mod ratio;
pub mod reframe;
pub mod resume;
pub mod snapshot;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{CollectionError, MAX_ITEMS, MediaCollection};
pub use composer::{ComposerError, ComposerSession, ComposerState, Placement, ReturnReport};
pub use generation::{GenerationError, GenerationKind, GenerationOutput, parse_generation};
pub use handoff::{
    ConsumeOutcome, HandoffDesk, HandoffError, HandoffPayload, HandoffTicket, TICKET_TTL_SECS,
    TicketId,
};
pub use library::{InMemoryLibrary, LibraryError, SharedLibrary};
pub use ratio::{
    CropAxis, CropRect, Platform, PlatformProfile, RatioVerdict, TOLERANCE_FRACTION,
    compute_crop, evaluate,
};
pub use reframe::{
    ReframeError, Reframed, ReframedRef, measure, reframe, reframe_ref, try_reframe,
};
pub use resume::{ResumeLedger, ResumeLookup, ResumeRecord};
pub use snapshot::{
    FieldValue, PersistOutcome, SnapshotLimits, Snapshottable, WorkflowSnapshot,
};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use types::{Dimensions, INLINE_DATA_MARKER, MediaAsset, Origin};
