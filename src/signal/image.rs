//! Uploaded image handling: MIME resolution and data-URI encoding.

use base64::Engine as _;

/// MIME types the vision upstreams accept.
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// Sniff the MIME type from magic bytes.
pub fn detect_mime_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // PNG: 89 50 4E 47
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    // GIF87a / GIF89a
    if bytes.starts_with(b"GIF8") {
        return Some("image/gif");
    }
    // WebP: RIFF....WEBP
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some("image/webp");
    }

    None
}

/// Resolve the MIME type of an upload.
///
/// Order: declared part content type, file-name guess, magic bytes.
/// Returns `None` when the bytes are not a supported image, whatever the
/// declared type or file name say.
pub fn resolve_image_mime(
    declared: Option<&str>,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Option<String> {
    // Every branch requires image magic bytes; labels alone are not trusted.
    let sniffed = detect_mime_from_bytes(bytes)?;

    let declared = declared
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| is_supported(m));
    if let Some(mime) = declared {
        // Browsers sometimes send image/jpg; normalise to the registered name.
        return Some(if mime == "image/jpg" { "image/jpeg".into() } else { mime });
    }

    let guessed = file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
        .filter(|m| is_supported(m));
    if let Some(mime) = guessed {
        return Some(mime);
    }

    Some(sniffed.to_string())
}

fn is_supported(mime: &str) -> bool {
    mime == "image/jpg" || SUPPORTED_IMAGE_TYPES.contains(&mime)
}

/// Encode image bytes as a `data:` URI for the hosted model.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}
