//! Ordered media collection with a bounded "currently displayed" cursor.
//!
//! Assets arrive from three sources (generation, upload, library pick)
//! and are removed by the user. The cursor always points at a valid
//! item while the collection is non-empty, and follows the asset it
//! pointed at when earlier items are removed.
//!
//! Every mutation reads the collection as it is *now*. Asynchronous
//! completions that land out of order therefore never overwrite each
//! other: two racing appends both persist, in completion order.

use serde::{Deserialize, Serialize};

use crate::types::{MediaAsset, Origin};

/// Maximum number of assets a collection holds.
pub const MAX_ITEMS: usize = 20;

/// Errors from collection mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// The collection already holds [`MAX_ITEMS`] assets.
    #[error("media collection is full ({max} items); remove an image before adding another")]
    CapacityExceeded {
        /// The capacity that was hit.
        max: usize,
    },

    /// An index did not refer to an existing asset.
    #[error("media index {index} is out of range for {len} items")]
    IndexOutOfRange {
        /// The rejected index.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },
}

/// An ordered list of media assets plus a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCollection {
    items: Vec<MediaAsset>,
    cursor: Option<usize>,
}

impl MediaCollection {
    /// Create an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
        }
    }

    /// Number of assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when the collection holds no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` when no more assets can be added.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_ITEMS
    }

    /// Index of the displayed asset, `None` when empty.
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The displayed asset, `None` when empty.
    #[must_use]
    pub fn current(&self) -> Option<&MediaAsset> {
        self.cursor.and_then(|index| self.items.get(index))
    }

    /// The asset at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MediaAsset> {
        self.items.get(index)
    }

    /// All assets in display order.
    #[must_use]
    pub fn items(&self) -> &[MediaAsset] {
        &self.items
    }

    /// Iterate over assets in display order.
    pub fn iter(&self) -> std::slice::Iter<'_, MediaAsset> {
        self.items.iter()
    }

    /// Append an asset at the end.
    ///
    /// The first asset inserted into an empty collection becomes the
    /// displayed one; otherwise the cursor does not move.
    ///
    /// Returns the index of the new asset.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when full; the
    /// existing assets are left untouched.
    pub fn append(&mut self, asset: MediaAsset) -> Result<usize, CollectionError> {
        self.ensure_room()?;
        self.items.push(asset);
        if self.cursor.is_none() {
            self.cursor = Some(0);
        }
        Ok(self.items.len() - 1)
    }

    /// Merge a fresh generation result.
    ///
    /// Assets from an earlier generation are superseded by the new one;
    /// uploaded and library assets are kept in their relative order. The
    /// new asset becomes index 0 and is displayed.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CapacityExceeded`] when the retained
    /// assets already fill the collection; nothing is removed in that case.
    pub fn merge_generated(&mut self, asset: MediaAsset) -> Result<(), CollectionError> {
        let retained = self
            .items
            .iter()
            .filter(|item| item.origin() != Origin::Generated)
            .count();
        if retained >= MAX_ITEMS {
            return Err(CollectionError::CapacityExceeded { max: MAX_ITEMS });
        }
        self.items.retain(|item| item.origin() != Origin::Generated);
        self.items.insert(0, asset);
        self.cursor = Some(0);
        Ok(())
    }

    /// Remove the asset at `index` and return it.
    ///
    /// The cursor keeps pointing at the same asset when an earlier one is
    /// removed, and is clamped to the new last index when the displayed
    /// asset was the last one.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] if `index` is not a
    /// valid position.
    pub fn remove_at(&mut self, index: usize) -> Result<MediaAsset, CollectionError> {
        self.check_index(index)?;
        let removed = self.items.remove(index);
        self.cursor = match self.items.len() {
            0 => None,
            len => {
                let cursor = self.cursor.unwrap_or(0);
                if index < cursor {
                    Some(cursor - 1)
                } else {
                    Some(cursor.min(len - 1))
                }
            }
        };
        Ok(removed)
    }

    /// Display the asset at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] if `index` is not a
    /// valid position.
    pub fn set_cursor(&mut self, index: usize) -> Result<(), CollectionError> {
        self.check_index(index)?;
        self.cursor = Some(index);
        Ok(())
    }

    /// Swap the asset at `index` for `asset`, keeping its position.
    ///
    /// Used when an edited image comes back from a hand-off. The cursor
    /// does not move. Returns the replaced asset.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexOutOfRange`] if `index` is not a
    /// valid position.
    pub fn replace_at(
        &mut self,
        index: usize,
        asset: MediaAsset,
    ) -> Result<MediaAsset, CollectionError> {
        self.check_index(index)?;
        Ok(std::mem::replace(&mut self.items[index], asset))
    }

    /// Remove every asset.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = None;
    }

    fn ensure_room(&self) -> Result<(), CollectionError> {
        if self.is_full() {
            return Err(CollectionError::CapacityExceeded { max: MAX_ITEMS });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), CollectionError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(CollectionError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

impl<'a> IntoIterator for &'a MediaCollection {
    type Item = &'a MediaAsset;
    type IntoIter = std::slice::Iter<'a, MediaAsset>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
