use std::sync::LazyLock;

use regex::Regex;

pub const MAX_ID_LEN: usize = 64;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier pattern compiles"));

/// Policy and user ids end up inside Redis keys, so `:` and whitespace are not allowed.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && ID_PATTERN.is_match(id)
}

/// First hop of an `X-Forwarded-For` style list.
pub fn first_forwarded(value: &str) -> Option<String> {
    value
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{first_forwarded, is_valid_id};

    #[test]
    fn test_basic() {
        assert!(is_valid_id("64f1c2a9e13b"));
        assert!(is_valid_id("acceptable-use_policy"));
        assert!(is_valid_id("A"));
    }

    #[test]
    fn test_empty_string() {
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_special_characters() {
        assert!(!is_valid_id("policy:1"));
        assert!(!is_valid_id("user 1"));
        assert!(!is_valid_id("../etc"));
        assert!(!is_valid_id("user\n"));
    }

    #[test]
    fn test_length_limit() {
        assert!(is_valid_id(&"a".repeat(64)));
        assert!(!is_valid_id(&"a".repeat(65)));
    }

    #[test]
    fn test_forwarded_hops() {
        assert_eq!(first_forwarded("203.0.113.7, 10.0.0.1").as_deref(), Some("203.0.113.7"));
        assert_eq!(first_forwarded("  198.51.100.2 ").as_deref(), Some("198.51.100.2"));
        assert_eq!(first_forwarded(" , "), None);
    }
}
