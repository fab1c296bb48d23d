//! Content fingerprinting used as the Store's uniqueness key.

use sha2::{Digest, Sha256};

/// Normalize a source name: trimmed and lower-cased.
#[must_use]
pub fn normalize_source(source: &str) -> String {
    source.trim().to_lowercase()
}

/// Normalize a coupon code: trimmed and lower-cased.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Normalize a coupon URL: trimmed, lower-cased, trailing `/` removed.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase().trim_end_matches('/').to_string()
}

/// Stable SHA-256 hex fingerprint of `(source, code, url)` after normalization.
#[must_use]
pub fn coupon_hash(source: &str, code: &str, url: &str) -> String {
    let input = format!(
        "{}\x00{}\x00{}",
        normalize_source(source),
        normalize_code(code),
        normalize_url(url),
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_whitespace_variants_share_a_hash() {
        let a = coupon_hash("Generic", "SAVE10 ", "HTTP://Site.com/a/");
        let b = coupon_hash("generic", "save10", "http://site.com/a");
        assert_eq!(a, b);
    }

    #[test]
    fn different_sources_do_not_collide() {
        let a = coupon_hash("warp", "STUDENT", "https://example.com");
        let b = coupon_hash("tabnine", "STUDENT", "https://example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = coupon_hash("s", "ab", "c");
        let b = coupon_hash("s", "a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let h = coupon_hash("s", "c", "u");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn normalize_url_strips_every_trailing_slash() {
        assert_eq!(normalize_url(" https://X.com/deals// "), "https://x.com/deals");
    }
}
