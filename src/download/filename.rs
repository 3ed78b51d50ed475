//! Filename derivation and sanitization.

use url::Url;

/// Extract a filename from a Content-Disposition header.
///
/// Handles both the RFC 5987 `filename*=` form (percent-encoded) and the
/// plain `filename=` form, quoted or bare.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(start) = header.find("filename*=") {
        let rest = &header[start + 10..];
        if let Some(quote_start) = rest.find("''") {
            let encoded = rest[quote_start + 2..].split([';', ' ']).next()?;
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let filename = decoded.trim().to_string();
                if !filename.is_empty() {
                    return Some(filename);
                }
            }
        }
    }

    // Try filename= (standard format)
    if let Some(start) = header.find("filename=") {
        let rest = &header[start + 9..];
        let filename = if let Some(quoted) = rest.strip_prefix('"') {
            quoted.split('"').next()
        } else {
            rest.split([';', ' ']).next()
        };

        if let Some(name) = filename {
            let name = name.trim().to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    None
}

/// Replace filesystem-hostile characters and bound the length.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('_').trim_matches('.');
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.chars().take(100).collect()
    }
}

/// Map a Content-Type to a file extension.
///
/// Common media types get a canonical short form; anything else falls back
/// to the mime_guess registry. `application/octet-stream` deliberately maps
/// to nothing so the URL or caller hint can win.
pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/webm" => Some("webm"),
        "video/x-m4v" => Some("m4v"),
        "audio/mpeg" => Some("mp3"),
        "audio/mp4" => Some("m4a"),
        "application/octet-stream" | "" => None,
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first())
            .copied(),
    }
}

/// Base name and extension from the last URL path segment, ignoring the
/// query string.
pub fn split_url_filename(url: &Url) -> (Option<String>, Option<String>) {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string);

    match segment {
        Some(name) => {
            let ext = extension_of(&name).map(str::to_string);
            let base = strip_extension(&name).to_string();
            let base = if base.is_empty() { None } else { Some(base) };
            (base, ext)
        }
        None => (None, None),
    }
}

/// The extension of a filename, when it has a plausible one.
pub fn extension_of(name: &str) -> Option<&str> {
    let (base, ext) = name.rsplit_once('.')?;
    if base.is_empty() || ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

/// The filename without its extension.
pub fn strip_extension(name: &str) -> &str {
    match extension_of(name) {
        Some(ext) => &name[..name.len() - ext.len() - 1],
        None => name,
    }
}
