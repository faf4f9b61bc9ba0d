//! mediaferry-web: Browser adapters for mediaferry.
//!
//! Provides the browser-backed [`KeyValueStore`](mediaferry_core::KeyValueStore)
//! and console logging, plus constructors wiring them into the core's
//! hand-off desk and resume ledger. Hand-off tickets may carry inline
//! images, so they go to `sessionStorage`; snapshots and resume records
//! go to `localStorage`.

pub mod console;
pub mod storage;

use mediaferry_core::{HandoffDesk, ResumeLedger, SystemClock};

pub use console::init_logging;
pub use storage::{BrowserStorage, StorageArea, StorageError};

/// Hand-off desk over `sessionStorage`.
///
/// # Errors
///
/// Returns [`StorageError`] when session storage is unavailable.
pub fn session_desk() -> Result<HandoffDesk<BrowserStorage, SystemClock>, StorageError> {
    Ok(HandoffDesk::new(BrowserStorage::session()?, SystemClock))
}

/// Resume ledger over `localStorage`.
///
/// # Errors
///
/// Returns [`StorageError`] when local storage is unavailable.
pub fn durable_ledger() -> Result<ResumeLedger<BrowserStorage, SystemClock>, StorageError> {
    Ok(ResumeLedger::new(BrowserStorage::local()?, SystemClock))
}
