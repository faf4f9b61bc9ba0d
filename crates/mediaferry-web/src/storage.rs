//! `window.localStorage` / `window.sessionStorage` as a [`KeyValueStore`].
//!
//! All functions in this module require a browser environment
//! (`wasm32-unknown-unknown` target).

use mediaferry_core::{KeyValueStore, StoreError};
use wasm_bindgen::{JsCast, JsValue};

/// `DOMException` code browsers use for quota errors.
const QUOTA_EXCEEDED_CODE: u16 = 22;

/// Errors from browser storage calls.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// There is no `window` (e.g. running inside a worker).
    #[error("no global window")]
    NoWindow,

    /// The browser exposes no storage area (disabled or blocked).
    #[error("{0} storage is not available")]
    Missing(StorageArea),

    /// A write exceeded the origin's storage quota.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// Any other browser API error.
    #[error("browser API error: {0}")]
    JsError(String),
}

impl From<JsValue> for StorageError {
    fn from(value: JsValue) -> Self {
        match value.dyn_ref::<web_sys::DomException>() {
            Some(exception) if is_quota_error(&exception.name(), exception.code()) => {
                Self::QuotaExceeded
            }
            Some(exception) => {
                Self::JsError(format!("{}: {}", exception.name(), exception.message()))
            }
            None => match value.dyn_ref::<js_sys::Error>() {
                Some(error) => Self::JsError(String::from(error.message())),
                None => Self::JsError(format!("{value:?}")),
            },
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QuotaExceeded => Self::QuotaExceeded,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Which browser storage area backs a [`BrowserStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Survives browser restarts.
    Local,
    /// Cleared when the tab closes; survives reloads and navigation.
    Session,
}

impl std::fmt::Display for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Session => "session",
        })
    }
}

/// A browser storage area.
#[derive(Debug, Clone)]
pub struct BrowserStorage {
    storage: web_sys::Storage,
    area: StorageArea,
}

impl BrowserStorage {
    /// `window.localStorage`: the durable store for snapshots and
    /// resume records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when there is no window or local storage
    /// is blocked.
    pub fn local() -> Result<Self, StorageError> {
        Self::open(StorageArea::Local)
    }

    /// `window.sessionStorage`: the staging store for hand-off tickets.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when there is no window or session
    /// storage is blocked.
    pub fn session() -> Result<Self, StorageError> {
        Self::open(StorageArea::Session)
    }

    fn open(area: StorageArea) -> Result<Self, StorageError> {
        let window = web_sys::window().ok_or(StorageError::NoWindow)?;
        let storage = match area {
            StorageArea::Local => window.local_storage()?,
            StorageArea::Session => window.session_storage()?,
        }
        .ok_or(StorageError::Missing(area))?;
        Ok(Self { storage, area })
    }

    /// The storage area this handle writes to.
    #[must_use]
    pub const fn area(&self) -> StorageArea {
        self.area
    }
}

impl KeyValueStore for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage
            .get_item(key)
            .map_err(|e| StorageError::from(e).into())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StorageError::from(e).into())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.storage
            .remove_item(key)
            .map_err(|e| StorageError::from(e).into())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        tracing::debug!(area = %self.area, "clearing browser storage");
        self.storage
            .clear()
            .map_err(|e| StorageError::from(e).into())
    }
}

/// Whether a `DOMException` signals a full storage area.
///
/// Firefox reports `NS_ERROR_DOM_QUOTA_REACHED` instead of the standard
/// name; some engines only set the legacy code.
fn is_quota_error(name: &str, code: u16) -> bool {
    matches!(name, "QuotaExceededError" | "NS_ERROR_DOM_QUOTA_REACHED")
        || code == QUOTA_EXCEEDED_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_names() {
        assert!(is_quota_error("QuotaExceededError", 0));
        assert!(is_quota_error("NS_ERROR_DOM_QUOTA_REACHED", 1014));
        assert!(is_quota_error("", QUOTA_EXCEEDED_CODE));
        assert!(!is_quota_error("SecurityError", 18));
    }

    #[test]
    fn quota_maps_to_store_quota() {
        assert_eq!(
            StoreError::from(StorageError::QuotaExceeded),
            StoreError::QuotaExceeded
        );
        assert_eq!(
            StoreError::from(StorageError::Missing(StorageArea::Session)),
            StoreError::Unavailable("session storage is not available".into())
        );
    }
}
