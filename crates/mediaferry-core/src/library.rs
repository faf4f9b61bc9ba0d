//! Contract of the shared media library.
//!
//! The library is an external service shared by every composer. The core
//! reads it and appends to it through [`SharedLibrary`]; it never touches
//! the library's own storage.

use std::collections::BTreeMap;

use crate::types::{Dimensions, MediaAsset, Origin};

/// Errors reported by a [`SharedLibrary`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    /// The library could not be reached.
    #[error("shared library unavailable: {0}")]
    Unavailable(String),

    /// The library refused the asset.
    #[error("shared library rejected {image_ref}: {reason}")]
    Rejected { image_ref: String, reason: String },
}

/// Read/append access to the shared media library.
pub trait SharedLibrary {
    /// Every asset in the library, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Unavailable`] when the library cannot be read.
    fn list_all(&self) -> Result<Vec<MediaAsset>, LibraryError>;

    /// Add `image_ref` to the library and return the stored asset.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Rejected`] when the library refuses the
    /// reference.
    fn add_from_ref(
        &mut self,
        image_ref: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MediaAsset, LibraryError>;
}

/// A library held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLibrary {
    entries: Vec<(MediaAsset, BTreeMap<String, String>)>,
}

impl InMemoryLibrary {
    /// An empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata recorded for `image_ref`, if present.
    #[must_use]
    pub fn metadata(&self, image_ref: &str) -> Option<&BTreeMap<String, String>> {
        self.entries
            .iter()
            .find(|(asset, _)| asset.image_ref() == image_ref)
            .map(|(_, metadata)| metadata)
    }

    /// Number of stored assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the library holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SharedLibrary for InMemoryLibrary {
    fn list_all(&self) -> Result<Vec<MediaAsset>, LibraryError> {
        Ok(self.entries.iter().map(|(asset, _)| asset.clone()).collect())
    }

    fn add_from_ref(
        &mut self,
        image_ref: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MediaAsset, LibraryError> {
        if image_ref.trim().is_empty() {
            return Err(LibraryError::Rejected {
                image_ref: image_ref.to_owned(),
                reason: "empty reference".to_owned(),
            });
        }
        if let Some((asset, _)) = self
            .entries
            .iter()
            .find(|(asset, _)| asset.image_ref() == image_ref)
        {
            return Ok(asset.clone());
        }
        let asset = MediaAsset::new(image_ref, Dimensions::UNMEASURED, Origin::Gallery);
        self.entries.push((asset.clone(), metadata.clone()));
        tracing::debug!(total = self.entries.len(), "added asset to shared library");
        Ok(asset)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn added_assets_are_listed_as_gallery() {
        let mut library = InMemoryLibrary::new();
        let meta = BTreeMap::from([("prompt".to_owned(), "beach".to_owned())]);
        let asset = library.add_from_ref("https://cdn/a.png", &meta).unwrap();
        assert_eq!(asset.origin(), Origin::Gallery);

        let all = library.list_all().unwrap();
        assert_eq!(all, [asset]);
        assert_eq!(library.metadata("https://cdn/a.png"), Some(&meta));
    }

    #[test]
    fn adding_twice_keeps_one_entry() {
        let mut library = InMemoryLibrary::new();
        library.add_from_ref("a", &BTreeMap::new()).unwrap();
        library.add_from_ref("a", &BTreeMap::new()).unwrap();
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn empty_reference_is_rejected() {
        let mut library = InMemoryLibrary::new();
        let err = library.add_from_ref("  ", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, LibraryError::Rejected { .. }));
        assert!(library.is_empty());
    }
}
