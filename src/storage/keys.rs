//! Storage key sanitization and object-storage path encoding.

use crate::error::{AppError, Result};

const MAX_KEY_LEN: usize = 1024;
const MAX_FILE_NAME_LEN: usize = 255;

/// Reject keys that could escape the storage root or that no backend can
/// represent. Runs before any storage I/O.
pub fn validate_key(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(AppError::Validation(format!("Invalid storage key {:?}: {}", name, reason)));

    if name.is_empty() {
        return invalid("empty");
    }
    if name.len() > MAX_KEY_LEN {
        return invalid("too long");
    }
    if name.starts_with('/') || name.contains('\\') || has_drive_prefix(name) {
        return invalid("absolute path");
    }
    if name.chars().any(|c| c.is_control()) {
        return invalid("control character");
    }
    for segment in name.split('/') {
        match segment {
            "" => return invalid("empty path segment"),
            "." | ".." => return invalid("path traversal"),
            _ => {}
        }
    }
    // Encoded dots and separators would turn into traversal once a backend
    // or proxy decodes the path.
    let lower = name.to_ascii_lowercase();
    if urlencoding::decode(name).is_err() || ["%2e", "%2f", "%5c"].iter().any(|s| lower.contains(s)) {
        return invalid("malformed encoding");
    }
    Ok(())
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Percent-encode an object key for the request path. Each segment keeps only
/// `A-Z a-z 0-9 - _ . ~`; `/` stays a separator. Input must be raw (never
/// pre-encoded) so nothing gets encoded twice.
pub fn encode_key(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reduce a client-supplied file name to its last path component with control
/// characters stripped. Falls back to "file" when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();

    let mut truncated = String::new();
    for c in cleaned.chars() {
        if truncated.len() + c.len_utf8() > MAX_FILE_NAME_LEN {
            break;
        }
        truncated.push(c);
    }

    if truncated.is_empty() {
        "file".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_content_keys() {
        assert!(validate_key("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08").is_ok());
        assert!(validate_key("fonts/inter.woff2").is_ok());
    }

    #[test]
    fn rejects_escaping_keys() {
        for key in ["", "../etc/passwd", "a/../../b", "/abs", "C:/windows", "a\\b", "a//b", "./a", "a\u{0}b"] {
            assert!(
                matches!(validate_key(key), Err(AppError::Validation(_))),
                "{:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn rejects_encoded_traversal() {
        assert!(validate_key("%2e%2e/secret").is_err());
        assert!(validate_key("a%2Fb").is_err());
    }

    #[test]
    fn encodes_segments_without_touching_separators() {
        assert_eq!(encode_key("photos/my image (1).png"), "photos/my%20image%20%281%29.png");
        assert_eq!(encode_key("a+b=c!*'"), "a%2Bb%3Dc%21%2A%27");
        assert_eq!(encode_key("safe-_.~"), "safe-_.~");
    }

    #[test]
    fn encoding_is_not_applied_twice() {
        assert_eq!(encode_key("100%"), "100%25");
        assert_ne!(encode_key(&encode_key("a b")), encode_key("a b"));
    }

    #[test]
    fn sanitizes_client_file_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\photo.jpg"), "photo.jpg");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("bad\u{7}name.png"), "badname.png");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name(&"x".repeat(300)).len(), 255);
    }
}
