//! Media input validation and normalization.
//!
//! Clients send media as an http(s) URL, a base64 data URI, or a bare
//! base64 payload. Everything is normalized here, before any provider
//! sees it: bare base64 is decoded, sniffed to a known format and
//! rewrapped as a data URI. Vendors only ever receive the two canonical
//! forms.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{MorphoError, Result};
use crate::types::kind::MediaClass;

/// Data-URI media subtypes accepted for image inputs.
const IMAGE_SUBTYPES: &[&str] = &["jpeg", "jpg", "png", "webp", "gif", "bmp"];

/// Data-URI media subtypes accepted for video inputs.
const VIDEO_SUBTYPES: &[&str] = &["mp4", "quicktime", "webm", "x-msvideo"];

/// A validated media input in one of the two canonical wire forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaInput {
    /// Remote reference, fetched by the vendor.
    Url(String),
    /// Inline payload as a `data:<type>;base64,<payload>` URI.
    DataUri(String),
}

impl MediaInput {
    /// Validate and normalize a raw client-supplied input for the given
    /// media class.
    pub fn parse(raw: &str, class: MediaClass) -> Result<MediaInput> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MorphoError::InvalidInput("empty media input".into()));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(MediaInput::Url(raw.to_string()));
        }

        if raw.starts_with("data:") {
            validate_data_uri(raw, class)?;
            return Ok(MediaInput::DataUri(raw.to_string()));
        }

        // Bare base64: decode strictly, sniff the format, rewrap.
        let decoded = BASE64.decode(raw).map_err(|_| {
            MorphoError::InvalidInput(
                "media input is not a URL, data URI, or valid base64".into(),
            )
        })?;
        match sniff_format(&decoded) {
            Some((mime, detected)) if detected == class => {
                Ok(MediaInput::DataUri(format!("data:{mime};base64,{raw}")))
            }
            Some((mime, _)) => Err(MorphoError::InvalidInput(format!(
                "media payload is {mime}, which does not fit this input"
            ))),
            None => Err(MorphoError::InvalidInput(
                "unrecognized media payload format".into(),
            )),
        }
    }

    /// Canonical string sent to vendors.
    pub fn as_str(&self) -> &str {
        match self {
            MediaInput::Url(s) | MediaInput::DataUri(s) => s,
        }
    }
}

fn validate_data_uri(raw: &str, class: MediaClass) -> Result<()> {
    let rest = &raw["data:".len()..];
    let Some((media_type, _payload)) = rest.split_once(";base64,") else {
        return Err(MorphoError::InvalidInput(
            "data URI must carry a base64 payload".into(),
        ));
    };
    let Some((top, subtype)) = media_type.split_once('/') else {
        return Err(MorphoError::InvalidInput(format!(
            "malformed data URI media type: {media_type}"
        )));
    };
    let allowed = match (class, top) {
        (MediaClass::Image, "image") => IMAGE_SUBTYPES.contains(&subtype),
        (MediaClass::Video, "video") => VIDEO_SUBTYPES.contains(&subtype),
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(MorphoError::InvalidInput(format!(
            "unsupported media type for this input: {media_type}"
        )))
    }
}

/// Identify a payload by magic bytes. Covers the formats vendors accept;
/// everything else is rejected rather than forwarded blind.
fn sniff_format(bytes: &[u8]) -> Option<(&'static str, MediaClass)> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(("image/jpeg", MediaClass::Image));
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(("image/png", MediaClass::Image));
    }
    if bytes.starts_with(b"GIF8") {
        return Some(("image/gif", MediaClass::Image));
    }
    if bytes.starts_with(b"RIFF") && bytes.len() >= 12 {
        return match &bytes[8..12] {
            b"WEBP" => Some(("image/webp", MediaClass::Image)),
            b"AVI " => Some(("video/x-msvideo", MediaClass::Video)),
            _ => None,
        };
    }
    if bytes.starts_with(b"BM") {
        return Some(("image/bmp", MediaClass::Image));
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return if &bytes[8..12] == b"qt  " {
            Some(("video/quicktime", MediaClass::Video))
        } else {
            Some(("video/mp4", MediaClass::Video))
        };
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(("video/webm", MediaClass::Video));
    }
    None
}
