// src/utils/mod.rs

//! Utility functions and helpers.

pub mod http;

use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Cut `text` to at most `budget` user-perceived characters.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.grapheme_indices(true).nth(budget) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Lowercase hex SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
