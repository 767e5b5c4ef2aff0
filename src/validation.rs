//! Centralized validation functions for blockd.
//!
//! This module provides unified validation for:
//! - Domain names supplied by clients (normalization and syntax)
//! - Duration strings used by the CLI (`30s`, `25m`, `4h`, `1d`)

use anyhow::{bail, Result};
use std::time::Duration;

use crate::error::BlockdError;

/// Maximum total length of a DNS name (without the trailing dot).
const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Normalize a user-supplied domain for use in hosts rules.
///
/// Strips surrounding whitespace, any `scheme://` prefix, userinfo, path,
/// query, fragment, port and trailing dot, then lowercases.
///
/// # Examples
/// ```
/// use blockd::validation::normalize_domain;
/// assert_eq!(normalize_domain("https://Reddit.com/r/rust"), "reddit.com");
/// assert_eq!(normalize_domain("  News.YCombinator.com  "), "news.ycombinator.com");
/// ```
pub fn normalize_domain(raw: &str) -> String {
    let mut s = raw.trim();

    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }

    if let Some(idx) = s.find(['/', '?', '#']) {
        s = &s[..idx];
    }

    if let Some(idx) = s.rfind('@') {
        s = &s[idx + 1..];
    }

    if let Some(idx) = s.find(':') {
        s = &s[..idx];
    }

    s.trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_ascii_lowercase()
}

/// Check that an already-normalized domain is a syntactically valid DNS name.
///
/// Requires at least two labels, ASCII letters/digits/hyphens only, no label
/// starting or ending with a hyphen. Anything else (whitespace, newlines,
/// `#`) could smuggle extra lines into the hosts file.
///
/// # Examples
/// ```
/// use blockd::validation::is_valid_domain;
/// assert!(is_valid_domain("example.com"));
/// assert!(is_valid_domain("xn--bcher-kva.example"));
/// assert!(!is_valid_domain("localhost"));
/// assert!(!is_valid_domain("evil.com\n1.2.3.4 bank.com"));
/// ```
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN || !domain.is_ascii() {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    })
}

/// Normalize and validate every domain of a request.
///
/// Returns the normalized list in the supplied order, without duplicates.
pub fn validate_domains(domains: &[String]) -> Result<Vec<String>, BlockdError> {
    let mut normalized: Vec<String> = Vec::with_capacity(domains.len());

    for raw in domains {
        let domain = normalize_domain(raw);
        if !is_valid_domain(&domain) {
            return Err(BlockdError::InvalidDomain(raw.clone()));
        }
        if !normalized.contains(&domain) {
            normalized.push(domain);
        }
    }

    if normalized.is_empty() {
        return Err(BlockdError::NoDomains);
    }

    Ok(normalized)
}

/// Parse a duration string with a `s`, `m`, `h` or `d` suffix.
///
/// # Errors
/// Returns an error with a descriptive message if the duration is invalid.
///
/// # Examples
/// ```
/// use blockd::validation::parse_duration;
/// use std::time::Duration;
/// assert_eq!(parse_duration("25m").unwrap(), Duration::from_secs(1500));
/// assert!(parse_duration("invalid").is_err());
/// ```
pub fn parse_duration(duration: &str) -> Result<Duration> {
    if duration.is_empty() {
        bail!("Duration cannot be empty");
    }

    // Reject non-ASCII to prevent Unicode edge cases with byte slicing
    if !duration.is_ascii() {
        bail!(
            "Invalid duration '{}'. Only ASCII characters allowed",
            duration
        );
    }

    if duration.len() < 2 {
        bail!(
            "Invalid duration '{}'. Use format like '30s', '25m', '4h', '1d'",
            duration
        );
    }

    let (num_part, suffix) = duration.split_at(duration.len() - 1);

    let multiplier: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => bail!(
            "Invalid duration '{}'. Suffix must be s, m, h, or d",
            duration
        ),
    };

    let value: u32 = match num_part.parse() {
        Ok(value) if value > 0 => value,
        _ => bail!(
            "Invalid duration '{}'. Number part must be a positive integer",
            duration
        ),
    };

    Ok(Duration::from_secs(u64::from(value) * multiplier))
}
