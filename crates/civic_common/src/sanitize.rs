//! Input sanitizing for everything that crosses a trust boundary.
//!
//! Resident messages, conversation history, model output, and case rows
//! coming back from the desk all pass through [`sanitize_text`] before
//! they are stored, prompted, or displayed. The filters are a denylist,
//! not an escape layer: dangerous fragments are removed outright.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

/// Ceiling for a single inbound chat message.
pub const MAX_MESSAGE_LEN: usize = 2000;
/// Ceiling for case descriptions and transcript fragments.
pub const MAX_DESCRIPTION_LEN: usize = 5000;
/// Ceiling for case subjects.
pub const MAX_SUBJECT_LEN: usize = 200;
/// Ceiling for email addresses.
pub const MAX_EMAIL_LEN: usize = 100;
/// Ceiling for phone numbers before digit stripping.
pub const MAX_PHONE_LEN: usize = 20;

/// Base64 payloads shorter than this are corrupt, not photos.
pub const MIN_PHOTO_BASE64_LEN: usize = 100;
/// Decoded photo ceiling: 10 MiB.
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bDROP\b",
        r"(?i)\bDELETE\b",
        r"(?i)\bUPDATE\b",
        r"(?i)\bINSERT\b",
        r"(?i)<script",
        r"(?i)javascript:",
        r"(?i)onerror=",
        r"(?i)onclick=",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("sanitizer pattern"))
    .collect()
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern")
});

/// Truncate to `max_len` characters, strip dangerous fragments, trim.
///
/// Truncation happens before filtering so an attacker cannot push the
/// filtered region past the ceiling.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let mut text: String = input.chars().take(max_len).collect();
    for pattern in DANGEROUS_PATTERNS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}

/// Validate an email address, returning the sanitized form.
pub fn validate_email(raw: &str) -> Option<String> {
    let email = sanitize_text(raw, MAX_EMAIL_LEN);
    if EMAIL_RE.is_match(&email) {
        Some(email)
    } else {
        None
    }
}

/// Validate a phone number, returning digits only (10 to 15 of them).
pub fn validate_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .take(MAX_PHONE_LEN)
        .filter(|c| c.is_ascii_digit())
        .collect();
    if (10..=15).contains(&digits.len()) {
        Some(digits)
    } else {
        None
    }
}

/// Validate a base64 photo payload, returning its decoded size in bytes.
///
/// Rejects payloads too short to be a real image, payloads that are not
/// valid base64, and payloads that decode past [`MAX_PHOTO_BYTES`].
pub fn validate_photo(base64_data: &str) -> Option<usize> {
    if base64_data.len() < MIN_PHOTO_BASE64_LEN {
        return None;
    }
    let decoded = BASE64.decode(base64_data.trim()).ok()?;
    if decoded.len() > MAX_PHOTO_BYTES {
        return None;
    }
    Some(decoded.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_script_fragments() {
        let out = sanitize_text("hello <script>alert(1)</script> world", MAX_MESSAGE_LEN);
        assert!(!out.to_lowercase().contains("<script"));
        assert!(out.contains("hello"));
        assert!(out.contains("world"));
    }

    #[test]
    fn test_sanitize_strips_sql_keywords_case_insensitive() {
        let out = sanitize_text("please drop TABLE and DeLeTe the rows", MAX_MESSAGE_LEN);
        assert!(!out.to_lowercase().contains("drop"));
        assert!(!out.to_lowercase().contains("delete"));
        assert!(out.contains("TABLE"));
    }

    #[test]
    fn test_sanitize_keeps_embedded_words_intact() {
        // Word boundaries protect words that merely contain a keyword.
        let out = sanitize_text("the updated dropdown menu", MAX_MESSAGE_LEN);
        assert_eq!(out, "the updated dropdown menu");
    }

    #[test]
    fn test_sanitize_truncates_before_filtering() {
        let long = "a".repeat(3000);
        let out = sanitize_text(&long, MAX_MESSAGE_LEN);
        assert_eq!(out.chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_text("  pothole on Main  ", 100), "pothole on Main");
    }

    #[test]
    fn test_sanitize_handles_multibyte_truncation() {
        let text = "é".repeat(50);
        let out = sanitize_text(&text, 10);
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn test_validate_email_accepts_normal_addresses() {
        assert_eq!(
            validate_email("resident@example.com"),
            Some("resident@example.com".to_string())
        );
        assert_eq!(
            validate_email("first.last+311@city.toronto.ca"),
            Some("first.last+311@city.toronto.ca".to_string())
        );
    }

    #[test]
    fn test_validate_email_rejects_bad_shapes() {
        assert_eq!(validate_email("not-an-email"), None);
        assert_eq!(validate_email("a@b"), None);
        assert_eq!(validate_email("spaces in@example.com"), None);
        assert_eq!(validate_email(""), None);
    }

    #[test]
    fn test_validate_email_rejects_overlong() {
        let local = "a".repeat(120);
        assert_eq!(validate_email(&format!("{local}@example.com")), None);
    }

    #[test]
    fn test_validate_phone_strips_formatting() {
        assert_eq!(
            validate_phone("(416) 392-2219"),
            Some("4163922219".to_string())
        );
        assert_eq!(
            validate_phone("+1 416 392 2219"),
            Some("14163922219".to_string())
        );
    }

    #[test]
    fn test_validate_phone_rejects_wrong_lengths() {
        assert_eq!(validate_phone("12345"), None);
        assert_eq!(validate_phone(""), None);
        assert_eq!(validate_phone("1234567890123456789"), None);
    }

    #[test]
    fn test_validate_photo_rejects_short_payloads() {
        assert_eq!(validate_photo("dGlueQ=="), None);
    }

    #[test]
    fn test_validate_photo_rejects_invalid_base64() {
        let junk = "!".repeat(200);
        assert_eq!(validate_photo(&junk), None);
    }

    #[test]
    fn test_validate_photo_accepts_small_image() {
        let payload = BASE64.encode(vec![0u8; 4096]);
        assert_eq!(validate_photo(&payload), Some(4096));
    }

    #[test]
    fn test_validate_photo_rejects_oversized_image() {
        let payload = BASE64.encode(vec![0u8; MAX_PHOTO_BYTES + 1]);
        assert_eq!(validate_photo(&payload), None);
    }
}
