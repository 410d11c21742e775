//! Render artifacts attached to graphs
//!
//! An artifact is an opaque image payload produced by the render collaborator.
//! Payloads loaded from a snapshot stay base64-encoded until first access.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

pub const PNG_MEDIA_TYPE: &str = "image/png";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArtifactError {
    #[error("Artifact payload is not valid base64: {0}")]
    Decode(String),
}

/// Image payload plus the metadata needed to show or re-render it
#[derive(Clone)]
pub struct RenderArtifact {
    pub media_type: String,
    /// Style phrase the image was rendered with
    pub style: Option<String>,
    /// Creation time (Unix milliseconds)
    pub created_at: i64,
    payload: Payload,
}

#[derive(Clone)]
enum Payload {
    Decoded(Bytes),
    Encoded {
        text: String,
        decoded: OnceLock<Result<Bytes, ArtifactError>>,
    },
}

impl RenderArtifact {
    pub fn new(media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        RenderArtifact {
            media_type: media_type.into(),
            style: None,
            created_at: now_millis(),
            payload: Payload::Decoded(data.into()),
        }
    }

    pub fn png(data: impl Into<Bytes>) -> Self {
        Self::new(PNG_MEDIA_TYPE, data)
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Wrap a base64 payload without decoding it
    pub fn from_base64(
        media_type: impl Into<String>,
        style: Option<String>,
        created_at: i64,
        encoded: String,
    ) -> Self {
        RenderArtifact {
            media_type: media_type.into(),
            style,
            created_at,
            payload: Payload::Encoded {
                text: encoded,
                decoded: OnceLock::new(),
            },
        }
    }

    /// Image bytes, decoding a deferred payload on first call
    pub fn bytes(&self) -> Result<Bytes, ArtifactError> {
        match &self.payload {
            Payload::Decoded(bytes) => Ok(bytes.clone()),
            Payload::Encoded { text, decoded } => decoded
                .get_or_init(|| {
                    STANDARD
                        .decode(text.as_bytes())
                        .map(Bytes::from)
                        .map_err(|e| ArtifactError::Decode(e.to_string()))
                })
                .clone(),
        }
    }

    /// Payload as base64, without decoding a deferred payload
    pub fn to_base64(&self) -> String {
        match &self.payload {
            Payload::Decoded(bytes) => STANDARD.encode(bytes),
            Payload::Encoded { text, .. } => text.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match &self.payload {
            Payload::Decoded(_) => true,
            Payload::Encoded { decoded, .. } => decoded.get().is_some(),
        }
    }
}

impl PartialEq for RenderArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type
            && self.style == other.style
            && self.created_at == other.created_at
            && self.to_base64() == other.to_base64()
    }
}

impl fmt::Debug for RenderArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderArtifact")
            .field("media_type", &self.media_type)
            .field("style", &self.style)
            .field("created_at", &self.created_at)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_payload() {
        let artifact = RenderArtifact::png(vec![1u8, 2, 3]).with_style("pixel art");
        assert!(artifact.is_loaded());
        assert_eq!(artifact.bytes().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(artifact.style.as_deref(), Some("pixel art"));
    }

    #[test]
    fn test_deferred_payload_decodes_on_access() {
        let encoded = STANDARD.encode([9u8, 8, 7]);
        let artifact = RenderArtifact::from_base64(PNG_MEDIA_TYPE, None, 0, encoded.clone());
        assert!(!artifact.is_loaded());
        assert_eq!(artifact.to_base64(), encoded);

        assert_eq!(artifact.bytes().unwrap().as_ref(), &[9, 8, 7]);
        assert!(artifact.is_loaded());
    }

    #[test]
    fn test_bad_payload_reports_decode_error() {
        let artifact =
            RenderArtifact::from_base64(PNG_MEDIA_TYPE, None, 0, "***not base64***".to_string());
        assert!(matches!(artifact.bytes(), Err(ArtifactError::Decode(_))));
    }

    #[test]
    fn test_equality_ignores_load_state() {
        let a = RenderArtifact::from_base64(PNG_MEDIA_TYPE, None, 5, STANDARD.encode([1u8]));
        let mut b = RenderArtifact::png(vec![1u8]);
        b.created_at = 5;
        assert_eq!(a, b);
    }
}
