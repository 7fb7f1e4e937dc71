//! Utility functions for URL handling, headline checks, and log formatting.
//!
//! This module provides helper functions used throughout the application:
//! - Input URL validation
//! - Keyword derivation from an article URL for the fallback path
//! - Headline sanity checks for extraction results
//! - String truncation for logging

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

static DOCUMENT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:s?html?|php|aspx?|jsp)$").expect("static regex"));

/// Parse `input` as an absolute `http` or `https` URL.
///
/// Returns `None` for anything else, including relative paths and other
/// schemes like `ftp:` or `javascript:`.
pub fn parse_article_url(input: &str) -> Option<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

/// Derive a keyword phrase from the last path segment of `url`.
///
/// The segment is percent-decoded, a trailing document extension is removed,
/// and separator characters become spaces.
///
/// # Returns
///
/// `None` when the URL does not parse or the phrase comes out empty.
///
/// # Examples
///
/// ```ignore
/// let kw = keywords_from_url("https://example.com/2024/09/apple-event-iphone.html");
/// assert_eq!(kw.as_deref(), Some("apple event iphone"));
/// ```
pub fn keywords_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segment = parsed.path().rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let stem = DOCUMENT_SUFFIX.replace(&decoded, "");

    let phrase = stem
        .split(|c: char| matches!(c, '-' | '_' | '+' | '.') || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .join(" ");
    debug!(%segment, %phrase, "Derived fallback keywords");

    if phrase.is_empty() { None } else { Some(phrase) }
}

/// Explain why an extracted headline is unusable, or `None` if it is fine.
///
/// Error pages tend to come back with titles like "Page Not Found" or
/// "404", which would otherwise end up memefied.
pub fn headline_rejection(headline: &str) -> Option<&'static str> {
    let trimmed = headline.trim();
    if trimmed.is_empty() {
        return Some("empty headline");
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("404") || lower.contains("not found") {
        return Some("headline looks like an error page");
    }
    None
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes, on a character
/// boundary, with an ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
