//! Shared types for mediaferry: media references and their provenance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that marks a media reference as an inline data URI
/// (`data:<mime>;base64,<payload>`) rather than a remote URL.
pub const INLINE_DATA_MARKER: &str = "data:";

/// Image dimensions in pixels.
///
/// Both fields are `0` until the image has been measured; see
/// [`Dimensions::is_measured`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Placeholder for an image whose pixels have not been decoded yet.
    pub const UNMEASURED: Self = Self {
        width: 0,
        height: 0,
    };

    /// Create dimensions from a width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` when both axes are non-zero.
    #[must_use]
    pub const fn is_measured(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Width divided by height, or `None` when unmeasured.
    #[must_use]
    pub fn ratio(self) -> Option<f64> {
        self.is_measured()
            .then(|| f64::from(self.width) / f64::from(self.height))
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How a [`MediaAsset`] entered a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Produced by the generation backend.
    Generated,
    /// Read from a local file chosen by the user.
    Uploaded,
    /// Picked from the shared media library.
    Gallery,
}

impl Origin {
    /// Display label for the origin.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generated => "Generated",
            Self::Uploaded => "Uploaded",
            Self::Gallery => "Gallery",
        }
    }

    /// Parse a label produced by [`Origin::label`].
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Generated, Self::Uploaded, Self::Gallery]
            .into_iter()
            .find(|origin| origin.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An image reference held by a media collection.
///
/// Immutable once created: re-measuring or re-framing produces a new
/// asset via [`MediaAsset::with_dimensions`] or [`MediaAsset::with_ref`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    image_ref: String,
    dimensions: Dimensions,
    origin: Origin,
}

impl MediaAsset {
    /// Create an asset with known (or [`Dimensions::UNMEASURED`]) dimensions.
    #[must_use]
    pub fn new(image_ref: impl Into<String>, dimensions: Dimensions, origin: Origin) -> Self {
        Self {
            image_ref: image_ref.into(),
            dimensions,
            origin,
        }
    }

    /// Create an asset whose pixels have not been measured yet.
    #[must_use]
    pub fn unmeasured(image_ref: impl Into<String>, origin: Origin) -> Self {
        Self::new(image_ref, Dimensions::UNMEASURED, origin)
    }

    /// The URL or inline data URI of the image.
    #[must_use]
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    /// Measured pixel dimensions (zero until measured).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Where the asset came from.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns `true` if the reference carries the image payload inline.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        is_inline_ref(&self.image_ref)
    }

    /// A copy of this asset with measured dimensions.
    #[must_use]
    pub fn with_dimensions(&self, dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            ..self.clone()
        }
    }

    /// A copy of this asset pointing at a different image, keeping the origin.
    #[must_use]
    pub fn with_ref(&self, image_ref: impl Into<String>, dimensions: Dimensions) -> Self {
        Self::new(image_ref, dimensions, self.origin)
    }
}

/// Returns `true` if `value` starts with [`INLINE_DATA_MARKER`].
#[must_use]
pub fn is_inline_ref(value: &str) -> bool {
    value
        .get(..INLINE_DATA_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INLINE_DATA_MARKER))
}
