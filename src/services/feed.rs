// src/services/feed.rs

//! Feed reader: turns the agency's RSS feed into candidate work items.
//!
//! Feed entries look like:
//!
//! ```text
//! <item>
//!   <title>EXAMPLE PAC - F3XN</title>
//!   <link>https://docquery.fec.gov/dcdev/posted/1900001.fec</link>
//!   <description>***** CommitteeId: C00000001 | FilingId: 1900001 | ... *****</description>
//!   <pubDate>Fri, 16 Oct 2026 14:03:00 +0000</pubDate>
//! </item>
//! ```
//!
//! Items come out in feed order (newest first). Entries without a usable
//! filing id are dropped.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use regex::{Captures, Regex};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ExtractionKind, PassConfig, WorkItem};
use crate::utils::{self, http};

/// Lazily consumed candidates, newest first.
pub type Candidates = BoxStream<'static, WorkItem>;

/// Source of new work.
///
/// Each call starts a fresh listing; callers may stop consuming at any
/// point.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn list_candidates(&self) -> Result<Candidates>;
}

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").unwrap());
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").unwrap());
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").unwrap());
static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<description\b[^>]*>(.*?)</description>").unwrap());
static PUB_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pubDate\b[^>]*>(.*?)</pubDate>").unwrap());
static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\*{5,}(.*?)\*{5,}").unwrap());
static FEC_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.fec(?:$|[?#])").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").unwrap()
});

/// RSS feed over HTTP.
pub struct RssFeed {
    client: reqwest::Client,
    url: String,
    kind: ExtractionKind,
}

impl RssFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>, kind: ExtractionKind) -> Self {
        Self {
            client,
            url: url.into(),
            kind,
        }
    }

    /// Feed for a configured pass.
    pub fn for_pass(client: reqwest::Client, pass: &PassConfig) -> Self {
        Self::new(client, &pass.feed_url, pass.strategy)
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn list_candidates(&self) -> Result<Candidates> {
        let body = http::fetch_text(&self.client, &self.url)
            .await
            .map_err(|e| AppError::feed(&self.url, e))?;
        let base = Url::parse(&self.url)?;
        log::debug!("Fetched feed {} ({} bytes)", self.url, body.len());
        Ok(stream::iter(RssItems::new(body, base, self.kind)).boxed())
    }
}

/// Iterator over the `<item>` blocks of an RSS document.
pub struct RssItems {
    body: String,
    pos: usize,
    base: Url,
    kind: ExtractionKind,
}

impl RssItems {
    pub fn new(body: String, base: Url, kind: ExtractionKind) -> Self {
        Self {
            body,
            pos: 0,
            base,
            kind,
        }
    }
}

impl Iterator for RssItems {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        loop {
            let caps = ITEM_RE.captures_at(&self.body, self.pos)?;
            let (whole, block) = (caps.get(0)?, caps.get(1)?);
            self.pos = whole.end();

            match parse_item(block.as_str(), &self.base, self.kind) {
                Some(item) => return Some(item),
                None => log::debug!("Skipping feed entry without filing id"),
            }
        }
    }
}

fn parse_item(block: &str, base: &Url, kind: ExtractionKind) -> Option<WorkItem> {
    let title = tag_text(&TITLE_RE, block).unwrap_or_default();
    let link = tag_text(&LINK_RE, block).unwrap_or_default();
    let description = tag_text(&DESCRIPTION_RE, block).unwrap_or_default();
    let meta = parse_meta(&description);

    let external_id = infer_external_id(&meta, &link)?;
    let published_at = tag_text(&PUB_DATE_RE, block).and_then(|raw| {
        let parsed = parse_pub_date(&raw);
        if parsed.is_none() {
            log::warn!("Unparseable pubDate '{}' for filing {}", raw, external_id);
        }
        parsed
    });

    Some(WorkItem {
        external_id,
        title,
        published_at,
        document_url: utils::resolve_url(base, &link),
        kind,
        meta,
    })
}

fn tag_text(pattern: &Regex, block: &str) -> Option<String> {
    let raw = pattern.captures(block)?.get(1)?.as_str();
    let text = match CDATA_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => unescape(raw),
    };
    Some(text.trim().to_string())
}

/// Decode character references and the predefined entities in a single
/// pass, so decoded text is never decoded again. Unknown or invalid
/// references are left as written.
fn unescape(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| match decode_entity(&caps[1]) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// RFC 2822 publish date, normalized to UTC.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse the `***** Key: Value | Key: Value *****` blob of a description.
pub fn parse_meta(description: &str) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    let Some(blob) = META_RE.captures(description).and_then(|c| c.get(1)) else {
        return meta;
    };

    for part in blob.as_str().split('|') {
        if let Some((key, value)) = part.split_once(':') {
            let key = key.trim();
            if !key.is_empty() {
                meta.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    meta
}

/// Filing id from the `FilingId` meta field, else from a `<id>.fec` link.
pub fn infer_external_id(meta: &BTreeMap<String, String>, link: &str) -> Option<String> {
    if let Some(id) = meta.get("FilingId").map(|v| v.trim()) {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return Some(id.to_string());
        }
    }
    FEC_LINK_RE
        .captures(link.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
