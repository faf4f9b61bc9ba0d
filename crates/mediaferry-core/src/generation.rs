//! Validation of generation-backend responses.
//!
//! The backend returns loosely shaped JSON whose field names vary between
//! endpoints (`image_url`, `imageUrl`, `image`; `content`, `text`, ...).
//! Responses are parsed once here into [`GenerationOutput`], a closed set
//! of shapes; nothing downstream looks at raw JSON.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const IMAGE_KEYS: &[&str] = &["image_url", "imageUrl", "image"];
const CAPTION_KEYS: &[&str] = &["caption", "content", "text"];
const BODY_KEYS: &[&str] = &["body", "content", "text"];
const HASHTAG_KEYS: &[&str] = &["hashtags", "tags"];

/// Which endpoint produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Caption, optional image and hashtags for a social post.
    SocialPost,
    /// Title, body and optional header image for a blog post.
    BlogPost,
    /// A standalone generated image.
    Image,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SocialPost => "social post",
            Self::BlogPost => "blog post",
            Self::Image => "image",
        })
    }
}

/// A validated generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutput {
    /// Result of [`GenerationKind::SocialPost`].
    SocialPost {
        caption: String,
        image: Option<String>,
        hashtags: Vec<String>,
    },
    /// Result of [`GenerationKind::BlogPost`].
    BlogPost {
        title: String,
        body: String,
        image: Option<String>,
    },
    /// Result of [`GenerationKind::Image`].
    Image {
        image_ref: String,
        /// Remaining string fields of the response (prompt, model, ...).
        metadata: BTreeMap<String, String>,
    },
}

impl GenerationOutput {
    /// The generated image, if the response carried one.
    #[must_use]
    pub fn image_ref(&self) -> Option<&str> {
        match self {
            Self::SocialPost { image, .. } | Self::BlogPost { image, .. } => image.as_deref(),
            Self::Image { image_ref, .. } => Some(image_ref),
        }
    }

    /// Text to show as the post caption, if any.
    ///
    /// For a blog post this is the title.
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        match self {
            Self::SocialPost { caption, .. } => Some(caption),
            Self::BlogPost { title, .. } => Some(title),
            Self::Image { .. } => None,
        }
    }

    /// The kind of endpoint this output came from.
    #[must_use]
    pub const fn kind(&self) -> GenerationKind {
        match self {
            Self::SocialPost { .. } => GenerationKind::SocialPost,
            Self::BlogPost { .. } => GenerationKind::BlogPost,
            Self::Image { .. } => GenerationKind::Image,
        }
    }
}

/// Errors from [`parse_generation`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The body was not a JSON object.
    #[error("malformed {kind} response: {reason}")]
    Malformed {
        kind: GenerationKind,
        reason: String,
    },

    /// A required field was missing, empty or not a string.
    #[error("{kind} response has no `{field}`")]
    MissingField {
        kind: GenerationKind,
        field: &'static str,
    },
}

/// Parse and validate a response body from the `kind` endpoint.
///
/// # Errors
///
/// Returns [`GenerationError::Malformed`] when `json` is not a JSON object
/// and [`GenerationError::MissingField`] when a required field is absent.
pub fn parse_generation(
    kind: GenerationKind,
    json: &str,
) -> Result<GenerationOutput, GenerationError> {
    let value: Value = serde_json::from_str(json).map_err(|e| GenerationError::Malformed {
        kind,
        reason: e.to_string(),
    })?;
    let Value::Object(fields) = value else {
        return Err(GenerationError::Malformed {
            kind,
            reason: "expected a JSON object".to_owned(),
        });
    };
    from_fields(kind, &fields)
}

fn from_fields(
    kind: GenerationKind,
    fields: &Map<String, Value>,
) -> Result<GenerationOutput, GenerationError> {
    let missing = |field| GenerationError::MissingField { kind, field };
    let output = match kind {
        GenerationKind::SocialPost => GenerationOutput::SocialPost {
            caption: first_text(fields, CAPTION_KEYS)
                .ok_or_else(|| missing("caption"))?,
            image: first_text(fields, IMAGE_KEYS),
            hashtags: hashtags(fields),
        },
        GenerationKind::BlogPost => GenerationOutput::BlogPost {
            title: first_text(fields, &["title"])
                .ok_or_else(|| missing("title"))?,
            body: first_text(fields, BODY_KEYS)
                .ok_or_else(|| missing("body"))?,
            image: first_text(fields, IMAGE_KEYS),
        },
        GenerationKind::Image => {
            let image_ref = first_text(fields, IMAGE_KEYS)
                .ok_or_else(|| missing("image_url"))?;
            let metadata = fields
                .iter()
                .filter(|(key, _)| !IMAGE_KEYS.contains(&key.as_str()))
                .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_owned())))
                .collect();
            GenerationOutput::Image {
                image_ref,
                metadata,
            }
        }
    };
    tracing::debug!(
        %kind,
        has_image = output.image_ref().is_some(),
        "validated generation response"
    );
    Ok(output)
}

/// The first non-blank string among `keys`.
fn first_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key)?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Hashtags given either as an array of strings or as one
/// whitespace-separated string. Leading `#` is normalized.
fn hashtags(fields: &Map<String, Value>) -> Vec<String> {
    let Some(value) = HASHTAG_KEYS.iter().find_map(|key| fields.get(*key)) else {
        return Vec::new();
    };
    let raw: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(text) => text.split_whitespace().collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|tag| tag.trim().trim_start_matches('#'))
        .filter(|tag| !tag.is_empty())
        .map(|tag| format!("#{tag}"))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn social_post_with_aliases() {
        let out = parse_generation(
            GenerationKind::SocialPost,
            r##"{"content":"  Hello spring  ","imageUrl":"https://cdn/x.png","hashtags":["spring","#sale"]}"##,
        )
        .unwrap();
        assert_eq!(
            out,
            GenerationOutput::SocialPost {
                caption: "Hello spring".into(),
                image: Some("https://cdn/x.png".into()),
                hashtags: vec!["#spring".into(), "#sale".into()],
            }
        );
        assert_eq!(out.image_ref(), Some("https://cdn/x.png"));
        assert_eq!(out.kind(), GenerationKind::SocialPost);
    }

    #[test]
    fn social_post_without_image_is_valid() {
        let out = parse_generation(
            GenerationKind::SocialPost,
            r##"{"caption":"hi","tags":"#a  b"}"##,
        )
        .unwrap();
        assert_eq!(out.image_ref(), None);
        let GenerationOutput::SocialPost { hashtags, .. } = out else {
            unreachable!()
        };
        assert_eq!(hashtags, ["#a", "#b"]);
    }

    #[test]
    fn blank_caption_falls_through_to_next_alias() {
        let out = parse_generation(
            GenerationKind::SocialPost,
            r#"{"caption":"   ","text":"from text"}"#,
        )
        .unwrap();
        assert_eq!(out.caption(), Some("from text"));
    }

    #[test]
    fn social_post_requires_caption() {
        let err = parse_generation(GenerationKind::SocialPost, r#"{"image":"x"}"#).unwrap_err();
        assert_eq!(
            err,
            GenerationError::MissingField {
                kind: GenerationKind::SocialPost,
                field: "caption"
            }
        );
    }

    #[test]
    fn blog_post_fields() {
        let out = parse_generation(
            GenerationKind::BlogPost,
            r#"{"title":"Ten tips","content":"Body text","image_url":"data:image/png;base64,AA"}"#,
        )
        .unwrap();
        assert_eq!(out.caption(), Some("Ten tips"));
        assert_eq!(out.image_ref(), Some("data:image/png;base64,AA"));
    }

    #[test]
    fn blog_post_requires_body() {
        let err = parse_generation(GenerationKind::BlogPost, r#"{"title":"t"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::MissingField { field: "body", .. }));
    }

    #[test]
    fn image_keeps_string_metadata() {
        let out = parse_generation(
            GenerationKind::Image,
            r#"{"image":"https://cdn/y.png","prompt":"a cat","seed":42}"#,
        )
        .unwrap();
        let GenerationOutput::Image { image_ref, metadata } = out else {
            unreachable!()
        };
        assert_eq!(image_ref, "https://cdn/y.png");
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["prompt"], "a cat");
    }

    #[test]
    fn image_requires_reference() {
        let err = parse_generation(GenerationKind::Image, r#"{"image_url":null}"#).unwrap_err();
        assert!(matches!(err, GenerationError::MissingField { .. }));
    }

    #[test]
    fn non_object_is_malformed() {
        for body in ["[]", "\"text\"", "{", ""] {
            let err = parse_generation(GenerationKind::Image, body).unwrap_err();
            assert!(matches!(err, GenerationError::Malformed { .. }), "{body}");
        }
    }

    #[test]
    fn error_messages_name_the_kind() {
        let err = parse_generation(GenerationKind::BlogPost, "{}").unwrap_err();
        assert_eq!(err.to_string(), "blog post response has no `title`");
    }
}
