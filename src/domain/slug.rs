//! Slug canonicalization for catalog identities.
//!
//! Upstream names are free text (often CJK); slugs must stay URL-safe and
//! stable. Names that canonicalize to nothing fall back to a prefixed
//! digest so distinct inputs still get distinct, deterministic slugs.

use sha2::{Digest, Sha256};

const MAX_SLUG_LEN: usize = 60;

/// Derive a URL-safe slug from free text.
///
/// Lowercases, drops quotes, collapses every other non-alphanumeric run
/// into a single `-`, trims edge dashes and caps the length. An input with
/// no ASCII alphanumerics at all (e.g. a purely CJK name) yields
/// `{prefix}-{10 hex chars of sha256(input)}`.
pub fn safe_slug(input: &str, prefix: &str) -> String {
    let mut base = String::new();
    let mut pending_dash = false;
    for ch in input.trim().to_lowercase().chars() {
        match ch {
            '\'' | '"' => {}
            c if c.is_ascii_lowercase() || c.is_ascii_digit() => {
                if pending_dash && !base.is_empty() {
                    base.push('-');
                }
                pending_dash = false;
                base.push(c);
            }
            _ => pending_dash = true,
        }
    }
    base.truncate(MAX_SLUG_LEN);

    if !base.is_empty() {
        return base;
    }

    let digest = Sha256::digest(input.as_bytes());
    format!("{prefix}-{}", &hex::encode(digest)[..10])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ascii_names_canonicalize() {
        assert_eq!(safe_slug("Hello World", "app"), "hello-world");
        assert_eq!(safe_slug("  My App 2.0  ", "app"), "my-app-2-0");
        assert_eq!(safe_slug("it's \"quoted\"", "app"), "its-quoted");
    }

    #[test]
    fn test_mixed_cjk_keeps_ascii_part() {
        // Non-ASCII runs collapse away; only the latin prefix remains.
        assert_eq!(safe_slug("AI助手", "app"), "ai");
    }

    #[test]
    fn test_pure_cjk_falls_back_to_hashed_slug() {
        let slug = safe_slug("微信", "app");
        assert!(slug.starts_with("app-"));
        assert_eq!(slug.len(), "app-".len() + 10);
        // Deterministic across calls.
        assert_eq!(slug, safe_slug("微信", "app"));
        // Distinct inputs get distinct fallbacks.
        assert_ne!(slug, safe_slug("支付宝", "app"));
    }

    #[test]
    fn test_length_cap() {
        let long = "a".repeat(200);
        assert_eq!(safe_slug(&long, "app").len(), 60);
    }

    proptest! {
        #[test]
        fn prop_slug_alphabet_and_length(input in ".{0,120}") {
            let slug = safe_slug(&input, "app");
            prop_assert!(!slug.is_empty());
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(slug.len() <= MAX_SLUG_LEN.max("app-".len() + 10));
        }
    }
}
