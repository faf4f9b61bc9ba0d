//! Pixel-level re-framing of images that miss a platform's ratio.
//!
//! Decodes the source, consults [`ratio::evaluate`](crate::ratio::evaluate),
//! and when the image is mismatched draws the center-crop region from
//! [`ratio::compute_crop`](crate::ratio::compute_crop) into a new PNG.
//!
//! Failure never blocks the caller: if the source cannot be decoded or
//! re-encoded, the original is handed back with [`CropAxis::None`] and
//! the image is treated as a match.

use std::borrow::Cow;
use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};

use crate::ratio::{self, CropAxis, CropRect, PlatformProfile, RatioVerdict};
use crate::types::{Dimensions, INLINE_DATA_MARKER, is_inline_ref};

/// Errors from the fallible re-framing steps.
///
/// The public entry points recover from all of these; the type is
/// exposed for callers that want to report why a fallback happened.
#[derive(Debug, thiserror::Error)]
pub enum ReframeError {
    /// The image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The cropped image could not be encoded.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The reference is not a base64 data URI and cannot be read here.
    #[error("unsupported media reference: {0}")]
    UnsupportedRef(String),
}

/// Result of re-framing raw image bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Reframed<'a> {
    /// Output image: borrowed original when untouched, fresh PNG otherwise.
    pub bytes: Cow<'a, [u8]>,
    /// Dimensions of `bytes` (unmeasured when decoding failed).
    pub dimensions: Dimensions,
    /// Ratio verdict for the source image.
    pub verdict: RatioVerdict,
    /// Region that was kept, when a crop was applied.
    pub crop: Option<CropRect>,
}

impl Reframed<'_> {
    /// Axis that was trimmed, or [`CropAxis::None`] when untouched.
    #[must_use]
    pub fn crop_axis(&self) -> CropAxis {
        if self.crop.is_some() {
            self.verdict.crop_axis
        } else {
            CropAxis::None
        }
    }
}

/// Result of re-framing a media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReframedRef {
    /// Re-framed data URI, or the original reference when untouched.
    pub image_ref: String,
    /// Dimensions of the referenced image (unmeasured when unknown).
    pub dimensions: Dimensions,
    /// Axis that was trimmed.
    pub crop_axis: CropAxis,
}

/// Read the pixel dimensions of an encoded image from its header.
///
/// Returns `None` for empty or undecodable input.
#[must_use]
pub fn measure(bytes: &[u8]) -> Option<Dimensions> {
    if bytes.is_empty() {
        return None;
    }
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(Dimensions::new(width, height)).filter(|d| d.is_measured())
}

/// Measure the image behind a media reference.
///
/// Only inline data URIs can be measured; remote URLs and undecodable
/// payloads come back [`Dimensions::UNMEASURED`].
#[must_use]
pub fn measure_ref(image_ref: &str) -> Dimensions {
    decode_data_uri(image_ref)
        .ok()
        .and_then(|bytes| measure(&bytes))
        .unwrap_or(Dimensions::UNMEASURED)
}

/// Center-crop `bytes` to `profile`'s ratio when it does not match.
///
/// Matching images are returned borrowed and untouched. Decode or
/// encode failures return the original with an assumed-match verdict.
#[must_use]
pub fn reframe<'a>(bytes: &'a [u8], profile: &PlatformProfile) -> Reframed<'a> {
    match try_reframe(bytes, profile) {
        Ok(reframed) => reframed,
        Err(err) => {
            tracing::warn!(profile = %profile.id, "re-framing skipped: {err}");
            Reframed {
                bytes: Cow::Borrowed(bytes),
                dimensions: Dimensions::UNMEASURED,
                verdict: RatioVerdict::assumed_match(profile.target_ratio),
                crop: None,
            }
        }
    }
}

/// Like [`reframe`], but reports failures instead of recovering.
///
/// # Errors
///
/// Returns [`ReframeError::Decode`] if `bytes` is not a decodable image
/// and [`ReframeError::Encode`] if the cropped image cannot be written.
pub fn try_reframe<'a>(
    bytes: &'a [u8],
    profile: &PlatformProfile,
) -> Result<Reframed<'a>, ReframeError> {
    if bytes.is_empty() {
        return Err(ReframeError::Decode("input image data is empty".into()));
    }
    // The decoded surface is owned by this frame and released on every
    // return path, including the early returns below.
    let surface =
        image::load_from_memory(bytes).map_err(|e| ReframeError::Decode(e.to_string()))?;
    let source = Dimensions::new(surface.width(), surface.height());
    let verdict = ratio::evaluate(source.width, source.height, profile);

    if verdict.is_match {
        return Ok(Reframed {
            bytes: Cow::Borrowed(bytes),
            dimensions: source,
            verdict,
            crop: None,
        });
    }

    let crop = ratio::compute_crop(source.width, source.height, profile.target_ratio);
    let cropped = surface.crop_imm(crop.x, crop.y, crop.width, crop.height);
    let encoded = encode_png(&cropped)?;
    Ok(Reframed {
        bytes: Cow::Owned(encoded),
        dimensions: crop.dimensions(),
        verdict,
        crop: Some(crop),
    })
}

/// Re-frame a media reference for `profile`.
///
/// Inline base64 data URIs are decoded, re-framed and re-emitted as a
/// PNG data URI. Remote URLs cannot be measured without I/O, so they are
/// returned unchanged and assumed to match; so is anything that fails
/// to decode.
#[must_use]
pub fn reframe_ref(image_ref: &str, profile: &PlatformProfile) -> ReframedRef {
    let untouched = |dimensions| ReframedRef {
        image_ref: image_ref.to_owned(),
        dimensions,
        crop_axis: CropAxis::None,
    };

    let bytes = match decode_data_uri(image_ref) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(profile = %profile.id, "reference not re-framed: {err}");
            return untouched(Dimensions::UNMEASURED);
        }
    };

    let reframed = reframe(&bytes, profile);
    match reframed.bytes {
        Cow::Borrowed(_) => untouched(reframed.dimensions),
        Cow::Owned(png) => ReframedRef {
            image_ref: encode_data_uri("image/png", &png),
            dimensions: reframed.dimensions,
            crop_axis: reframed.verdict.crop_axis,
        },
    }
}

/// Decode the payload of a `data:<mime>;base64,<payload>` reference.
///
/// # Errors
///
/// Returns [`ReframeError::UnsupportedRef`] for remote URLs and for data
/// URIs that are not base64-encoded, and [`ReframeError::Decode`] when
/// the payload is not valid base64.
pub fn decode_data_uri(image_ref: &str) -> Result<Vec<u8>, ReframeError> {
    if !is_inline_ref(image_ref) {
        return Err(ReframeError::UnsupportedRef(truncate_for_log(image_ref)));
    }
    let rest = &image_ref[INLINE_DATA_MARKER.len()..];
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ReframeError::UnsupportedRef("data URI without payload".into()))?;
    if !header
        .rsplit(';')
        .next()
        .is_some_and(|param| param.eq_ignore_ascii_case("base64"))
    {
        return Err(ReframeError::UnsupportedRef(format!(
            "data URI is not base64-encoded ({header})"
        )));
    }
    BASE64
        .decode(payload.trim())
        .map_err(|e| ReframeError::Decode(e.to_string()))
}

/// Build a base64 data URI for `bytes` with the given MIME type.
#[must_use]
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("{INLINE_DATA_MARKER}{mime};base64,{}", BASE64.encode(bytes))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ReframeError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ReframeError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Keep log lines short when a reference is a long URL.
fn truncate_for_log(value: &str) -> String {
    const MAX: usize = 64;
    match value.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ratio::Platform;

    /// Encode a solid-color PNG of the given size.
    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        encode_png(&DynamicImage::ImageRgba8(img)).unwrap()
    }

    fn square() -> PlatformProfile {
        PlatformProfile::new("square", 1.0)
    }

    #[test]
    fn measure_reads_header() {
        let png = solid_png(64, 36);
        assert_eq!(measure(&png), Some(Dimensions::new(64, 36)));
    }

    #[test]
    fn measure_ref_reads_inline_only() {
        let uri = encode_data_uri("image/png", &solid_png(12, 7));
        assert_eq!(measure_ref(&uri), Dimensions::new(12, 7));
        assert_eq!(measure_ref("https://cdn/a.png"), Dimensions::UNMEASURED);
        assert_eq!(measure_ref("data:image/png;base64,!!!"), Dimensions::UNMEASURED);
    }

    #[test]
    fn measure_rejects_garbage() {
        assert_eq!(measure(&[]), None);
        assert_eq!(measure(&[0xFF, 0x00, 0x13]), None);
    }

    #[test]
    fn matching_image_is_borrowed_untouched() {
        let png = solid_png(50, 50);
        let reframed = reframe(&png, &square());
        assert!(matches!(reframed.bytes, Cow::Borrowed(_)));
        assert!(reframed.verdict.is_match);
        assert_eq!(reframed.crop, None);
        assert_eq!(reframed.crop_axis(), CropAxis::None);
        assert_eq!(reframed.dimensions, Dimensions::new(50, 50));
    }

    #[test]
    fn wide_image_is_center_cropped() {
        let png = solid_png(160, 90);
        let reframed = reframe(&png, &square());
        assert_eq!(reframed.crop_axis(), CropAxis::Horizontal);
        assert_eq!(
            reframed.crop,
            Some(CropRect {
                x: 35,
                y: 0,
                width: 90,
                height: 90
            })
        );
        assert_eq!(measure(&reframed.bytes), Some(Dimensions::new(90, 90)));
    }

    #[test]
    fn tall_image_against_landscape_profile_is_vertically_cropped() {
        let png = solid_png(90, 160);
        let reframed = reframe(&png, &Platform::YouTube.profile());
        assert_eq!(reframed.crop_axis(), CropAxis::Vertical);
        let out = measure(&reframed.bytes).unwrap();
        assert_eq!(out.width, 90);
        assert_eq!(out.height, 51); // round(90 / (16/9)) = round(50.625)
    }

    #[test]
    fn undecodable_input_assumes_match() {
        let garbage = [1u8, 2, 3, 4, 5];
        let reframed = reframe(&garbage, &square());
        assert_eq!(reframed.bytes.as_ref(), &garbage);
        assert!(reframed.verdict.is_match);
        assert_eq!(reframed.crop_axis(), CropAxis::None);
        assert!(matches!(
            try_reframe(&garbage, &square()),
            Err(ReframeError::Decode(_))
        ));
        assert!(matches!(try_reframe(&[], &square()), Err(ReframeError::Decode(_))));
    }

    #[test]
    fn data_uri_round_trips() {
        let bytes = vec![0u8, 1, 2, 250];
        let uri = encode_data_uri("image/png", &bytes);
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap(), bytes);
    }

    #[test]
    fn non_base64_data_uri_is_unsupported() {
        assert!(matches!(
            decode_data_uri("data:text/plain,hello"),
            Err(ReframeError::UnsupportedRef(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64"),
            Err(ReframeError::UnsupportedRef(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,@@@"),
            Err(ReframeError::Decode(_))
        ));
    }

    #[test]
    fn remote_reference_is_returned_unchanged() {
        let url = "https://cdn.example.com/picture.jpg";
        let out = reframe_ref(url, &square());
        assert_eq!(out.image_ref, url);
        assert_eq!(out.crop_axis, CropAxis::None);
        assert_eq!(out.dimensions, Dimensions::UNMEASURED);
    }

    #[test]
    fn inline_reference_is_reframed_to_png_data_uri() {
        let uri = encode_data_uri("image/png", &solid_png(160, 90));
        let out = reframe_ref(&uri, &square());
        assert_eq!(out.crop_axis, CropAxis::Horizontal);
        assert_eq!(out.dimensions, Dimensions::new(90, 90));
        let decoded = decode_data_uri(&out.image_ref).unwrap();
        assert_eq!(measure(&decoded), Some(Dimensions::new(90, 90)));
    }

    #[test]
    fn inline_matching_reference_keeps_original_string() {
        let uri = encode_data_uri("image/png", &solid_png(40, 40));
        let out = reframe_ref(&uri, &square());
        assert_eq!(out.image_ref, uri);
        assert_eq!(out.dimensions, Dimensions::new(40, 40));
        assert_eq!(out.crop_axis, CropAxis::None);
    }

    #[test]
    fn truncate_for_log_shortens_long_values() {
        let long = "x".repeat(200);
        let short = truncate_for_log(&long);
        assert_eq!(short.len(), 67);
        assert_eq!(truncate_for_log("abc"), "abc");
    }
}
