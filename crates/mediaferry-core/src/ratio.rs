//! Aspect-ratio policy: match detection and deterministic center crops.
//!
//! Every destination platform has a target ratio (width / height). An
//! image matches when its ratio deviates from the target by at most
//! [`TOLERANCE_FRACTION`] of the target. A mismatched image is re-framed
//! with a symmetric center crop along one axis; there is no
//! content-aware cropping.
//!
//! Everything here is pure arithmetic. Pixel re-sampling lives in
//! [`crate::reframe`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Relative deviation from the target ratio still accepted as a match.
///
/// Fixed for the whole system and shared by every platform.
pub const TOLERANCE_FRACTION: f64 = 0.15;

/// Absorbs floating-point noise so that a deviation of exactly
/// [`TOLERANCE_FRACTION`] compares as a match.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// A supported publishing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Instagram feed post, 1:1.
    InstagramFeed,
    /// Instagram story, 9:16.
    InstagramStory,
    /// `TikTok` cover, 9:16.
    TikTok,
    /// Facebook link/feed image, 1.91:1.
    Facebook,
    /// `LinkedIn` shared image, 1.91:1.
    LinkedIn,
    /// X (Twitter) in-stream image, 16:9.
    X,
    /// `YouTube` thumbnail, 16:9.
    YouTube,
    /// Pinterest pin, 2:3.
    Pinterest,
}

impl Platform {
    /// All built-in platforms, in menu order.
    pub const ALL: [Self; 8] = [
        Self::InstagramFeed,
        Self::InstagramStory,
        Self::TikTok,
        Self::Facebook,
        Self::LinkedIn,
        Self::X,
        Self::YouTube,
        Self::Pinterest,
    ];

    /// Stable identifier used in snapshots and on the command line.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::InstagramFeed => "instagram",
            Self::InstagramStory => "instagram-story",
            Self::TikTok => "tiktok",
            Self::Facebook => "facebook",
            Self::LinkedIn => "linkedin",
            Self::X => "x",
            Self::YouTube => "youtube",
            Self::Pinterest => "pinterest",
        }
    }

    /// Human-readable platform name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InstagramFeed => "Instagram",
            Self::InstagramStory => "Instagram Story",
            Self::TikTok => "TikTok",
            Self::Facebook => "Facebook",
            Self::LinkedIn => "LinkedIn",
            Self::X => "X",
            Self::YouTube => "YouTube",
            Self::Pinterest => "Pinterest",
        }
    }

    /// Target width / height ratio.
    #[must_use]
    pub const fn target_ratio(self) -> f64 {
        match self {
            Self::InstagramFeed => 1.0,
            Self::InstagramStory | Self::TikTok => 9.0 / 16.0,
            Self::Facebook | Self::LinkedIn => 1.91,
            Self::X | Self::YouTube => 16.0 / 9.0,
            Self::Pinterest => 2.0 / 3.0,
        }
    }

    /// Ratio label as shown to users (e.g. `"16:9"`).
    #[must_use]
    pub const fn ratio_label(self) -> &'static str {
        match self {
            Self::InstagramFeed => "1:1",
            Self::InstagramStory | Self::TikTok => "9:16",
            Self::Facebook | Self::LinkedIn => "1.91:1",
            Self::X | Self::YouTube => "16:9",
            Self::Pinterest => "2:3",
        }
    }

    /// Look up a platform by its [`id`](Self::id), ignoring ASCII case.
    ///
    /// `"twitter"` is accepted as an alias for [`Platform::X`].
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        if id.eq_ignore_ascii_case("twitter") {
            return Some(Self::X);
        }
        Self::ALL
            .into_iter()
            .find(|platform| platform.id().eq_ignore_ascii_case(id))
    }

    /// The framing profile for this platform.
    #[must_use]
    pub fn profile(self) -> PlatformProfile {
        PlatformProfile::new(self.id(), self.target_ratio())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Framing requirements of one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformProfile {
    /// Destination identifier.
    pub id: String,
    /// Required width / height ratio. Always positive and finite.
    pub target_ratio: f64,
    /// Accepted relative deviation; always [`TOLERANCE_FRACTION`].
    pub tolerance_fraction: f64,
}

impl PlatformProfile {
    /// Create a profile for a custom destination.
    ///
    /// Non-positive or non-finite ratios are replaced by `1.0` so the
    /// policy never divides by zero.
    #[must_use]
    pub fn new(id: impl Into<String>, target_ratio: f64) -> Self {
        let target_ratio = if target_ratio.is_finite() && target_ratio > 0.0 {
            target_ratio
        } else {
            1.0
        };
        Self {
            id: id.into(),
            target_ratio,
            tolerance_fraction: TOLERANCE_FRACTION,
        }
    }
}

/// Axis along which a mismatched image is trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CropAxis {
    /// Too wide: left and right edges are trimmed.
    Horizontal,
    /// Too tall: top and bottom edges are trimmed.
    Vertical,
    /// No crop needed (match, or the image could not be measured).
    None,
}

impl fmt::Display for CropAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => f.write_str("horizontal"),
            Self::Vertical => f.write_str("vertical"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioVerdict {
    /// Whether the image is within tolerance of the target ratio.
    pub is_match: bool,
    /// Measured width / height. Equals the target when unmeasured.
    pub actual_ratio: f64,
    /// Which edges to trim; [`CropAxis::None`] when matching.
    pub crop_axis: CropAxis,
}

impl RatioVerdict {
    /// The verdict used when dimensions are unknown: assume a match.
    #[must_use]
    pub const fn assumed_match(profile_ratio: f64) -> Self {
        Self {
            is_match: true,
            actual_ratio: profile_ratio,
            crop_axis: CropAxis::None,
        }
    }

    /// Short advice for the user, or `None` when the image already fits.
    #[must_use]
    pub fn suggestion(&self, destination: &str) -> Option<String> {
        match self.crop_axis {
            CropAxis::Horizontal => Some(format!(
                "image is too wide for {destination} (ratio {:.2}): trim left/right",
                self.actual_ratio
            )),
            CropAxis::Vertical => Some(format!(
                "image is too tall for {destination} (ratio {:.2}): trim top/bottom",
                self.actual_ratio
            )),
            CropAxis::None => None,
        }
    }
}

/// Decide whether a `width` x `height` image fits `profile`.
///
/// A deviation of exactly the tolerance counts as a match. Zero-sized
/// (unmeasured) images are assumed to match.
#[must_use]
pub fn evaluate(width: u32, height: u32, profile: &PlatformProfile) -> RatioVerdict {
    let Some(actual_ratio) = Dimensions::new(width, height).ratio() else {
        return RatioVerdict::assumed_match(profile.target_ratio);
    };

    let target = profile.target_ratio;
    let deviation = (actual_ratio - target).abs() / target;
    if deviation <= profile.tolerance_fraction + BOUNDARY_EPSILON {
        return RatioVerdict {
            is_match: true,
            actual_ratio,
            crop_axis: CropAxis::None,
        };
    }

    let crop_axis = if actual_ratio > target {
        CropAxis::Horizontal
    } else {
        CropAxis::Vertical
    };
    RatioVerdict {
        is_match: false,
        actual_ratio,
        crop_axis,
    }
}

/// A crop rectangle in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width of the kept region.
    pub width: u32,
    /// Height of the kept region.
    pub height: u32,
}

impl CropRect {
    /// The rectangle covering a whole `width` x `height` image.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Size of the kept region.
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Compute the symmetric center crop that brings a `width` x `height`
/// image to `target_ratio`.
///
/// Too-wide images keep their full height and lose equal margins left
/// and right; too-tall images keep their full width and lose equal
/// margins top and bottom. An image already at the target (or with a
/// zero axis) gets the full frame back. The crop never exceeds the
/// source bounds and never collapses an axis to zero.
#[must_use]
pub fn compute_crop(width: u32, height: u32, target_ratio: f64) -> CropRect {
    let Some(actual_ratio) = Dimensions::new(width, height).ratio() else {
        return CropRect::full(width, height);
    };
    if !(target_ratio.is_finite() && target_ratio > 0.0) {
        return CropRect::full(width, height);
    }

    let (w, h) = (f64::from(width), f64::from(height));
    if actual_ratio > target_ratio {
        let crop_width = round_px(h * target_ratio).clamp(1, width);
        let x = round_px((w - f64::from(crop_width)) / 2.0);
        CropRect {
            x,
            y: 0,
            width: crop_width,
            height,
        }
    } else if actual_ratio < target_ratio {
        let crop_height = round_px(w / target_ratio).clamp(1, height);
        let y = round_px((h - f64::from(crop_height)) / 2.0);
        CropRect {
            x: 0,
            y,
            width,
            height: crop_height,
        }
    } else {
        CropRect::full(width, height)
    }
}

/// Round half away from zero to a pixel count.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_px(value: f64) -> u32 {
    // Inputs are bounded by u32 image sides, so the saturating cast is exact.
    value.round().max(0.0) as u32
}
