//! Utility module for common functionality
//!
//! Small helpers shared by the adapters: timing, log-safe strings and
//! request IDs.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

/// Async timing helper
pub async fn measure_time_async<F, T, Fut>(f: F) -> (T, Duration)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f().await;
    (result, start.elapsed())
}

/// Truncate a string to a maximum length, adding ellipsis if truncated
///
/// Cuts on a char boundary so backend messages with multi-byte text never panic.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let budget = if max_len <= 3 { max_len } else { max_len - 3 };
    let mut cut = budget;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }

    if max_len <= 3 {
        s[..cut].to_string()
    } else {
        format!("{}...", &s[..cut])
    }
}

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"Bearer [A-Za-z0-9\-_\.=]+", "Bearer [REDACTED]"),
        (r"Basic [A-Za-z0-9+/=]+", "Basic [REDACTED]"),
        (r"(?i)api[_-]?key[=:]\s*[A-Za-z0-9\-_]+", "api_key=[REDACTED]"),
        (r"(?i)password[=:]\s*[^\s&]+", "password=[REDACTED]"),
        (r"(?i)token[=:]\s*[^\s&]+", "token=[REDACTED]"),
        (r"gh[pousr]_[A-Za-z0-9]{20,}", "[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Sanitize a string for logging (remove sensitive data patterns)
pub fn sanitize_for_logging(s: &str) -> String {
    let mut result = s.to_string();
    for (re, replacement) in SENSITIVE_PATTERNS.iter() {
        result = re.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Generate a unique request ID
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 2), "hi");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ééééé";
        let truncated = truncate_string(text, 6);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 6);
    }

    #[test]
    fn test_sanitize_for_logging() {
        let input = "Authorization: Bearer abc123xyz";
        let output = sanitize_for_logging(input);
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("abc123xyz"));

        let basic = sanitize_for_logging("Authorization: Basic dXNlcjpwYXNz");
        assert!(!basic.contains("dXNlcjpwYXNz"));

        let password = sanitize_for_logging("login failed password=hunter2&user=x");
        assert!(!password.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_measure_time_async_returns_value() {
        let (value, elapsed) = measure_time_async(|| async { 7 }).await;
        assert_eq!(value, 7);
        assert!(elapsed < Duration::from_secs(1));
    }
}
