// src/ingest/mod.rs
pub mod feed;
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::ingest::feed::{parse_document, FeedDocument, RawItem};
use crate::ingest::types::{FeedFetcher, FeedItem, FeedSource, SourceItems};

/// Upper bound on normalized body length (chars); longer bodies are cut.
pub const MAX_CONTENT_CHARS: usize = 20_000;

const UNTITLED: &str = "Untitled";

/// Normalize text: decode entities, drop script/style, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Drop script/style blocks including their bodies
    static RE_BLOCKS: OnceCell<Regex> = OnceCell::new();
    let re_blocks = RE_BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap()
    });
    out = re_blocks.replace_all(&out, " ").to_string();

    // 3) Strip tags and comments; stray angle brackets become spaces
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags =
        RE_TAGS.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!?][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();
    out = out.replace(['<', '>'], " ");

    // 4) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 5) Collapse whitespace (includes NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_CONTENT_CHARS {
        out = out.chars().take(MAX_CONTENT_CHARS).collect();
    }
    out
}

/// Parse RFC 2822 (RSS) or RFC 3339 (Atom) timestamps. Unparsable → `None`.
pub fn parse_published(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    DateTime::parse_from_rfc2822(ts)
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lower one raw entry into a [`FeedItem`]. Entries without a link are rejected.
pub fn normalize_item(raw: RawItem, source_url: &str) -> Option<FeedItem> {
    let link = raw.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
    let title = normalize_text(&raw.title);
    Some(FeedItem {
        title: if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title
        },
        link,
        published: raw.published.as_deref().and_then(parse_published),
        content: normalize_text(&raw.body),
        source_url: source_url.to_string(),
        guid: raw.guid.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()),
    })
}

/// Normalize every entry of a parsed document; invalid entries are logged and counted.
pub fn normalize_document(doc: FeedDocument, source_url: &str) -> SourceItems {
    let mut out = SourceItems::default();
    for raw in doc.into_raw_items() {
        let title = raw.title.clone();
        match normalize_item(raw, source_url) {
            Some(item) => out.items.push(item),
            None => {
                tracing::warn!(source = source_url, title = %title, "skipping entry without link");
                out.skipped_invalid += 1;
            }
        }
    }
    out
}

/// Only encrypted transport is accepted for feed URLs.
pub fn ensure_https(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| PipelineError::transport(url, format!("invalid feed URL: {e}")))?;
    if parsed.scheme() == "https" {
        Ok(())
    } else {
        Err(PipelineError::transport(
            url,
            "feed URL must use the https scheme",
        ))
    }
}

/// Fetch, parse and normalize one source. Every failure is scoped to this source.
pub async fn load_source(fetcher: &dyn FeedFetcher, source: &FeedSource) -> Result<SourceItems> {
    ensure_https(&source.url)?;

    let body = fetcher.fetch(&source.url).await?;

    let t0 = std::time::Instant::now();
    let doc = parse_document(&body)?;
    let format = doc.format();
    let entries = doc.len();
    let items = normalize_document(doc, &source.url);
    histogram!("digest_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("digest_items_fetched_total").increment(items.items.len() as u64);

    tracing::info!(
        source = %source.url,
        fetcher = fetcher.name(),
        format = ?format,
        entries,
        kept = items.items.len(),
        skipped = items.skipped_invalid,
        "feed parsed"
    );
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_markup_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp;<b>world</b>!</p>\n\t<script>alert(1)</script>";
        assert_eq!(normalize_text(s), "Hello, world !");
    }

    #[test]
    fn escaped_markup_is_stripped_too() {
        let s = "&lt;div class=\"x\"&gt;Text&lt;/div&gt; a &lt; b";
        let out = normalize_text(s);
        assert!(!out.contains('<') && !out.contains('>'));
        assert!(out.starts_with("Text"));
    }

    #[test]
    fn stray_brackets_keep_words_apart() {
        assert_eq!(normalize_text("if x < y then a->b"), "if x y then a- b");
        assert_eq!(normalize_text("1&lt;2 and 3&gt;2"), "1 2 and 3 2");
    }

    #[test]
    fn published_accepts_both_formats() {
        assert!(parse_published("Tue, 10 Jun 2025 04:00:00 GMT").is_some());
        assert!(parse_published("2025-06-10T04:00:00+02:00").is_some());
        assert!(parse_published("yesterday").is_none());
    }

    #[test]
    fn items_without_link_are_rejected() {
        let raw = RawItem {
            title: "No link".into(),
            link: Some("   ".into()),
            ..RawItem::default()
        };
        assert!(normalize_item(raw, "https://example.com/feed").is_none());
    }

    #[test]
    fn empty_title_gets_placeholder() {
        let raw = RawItem {
            link: Some("https://example.com/x".into()),
            ..RawItem::default()
        };
        let item = normalize_item(raw, "https://example.com/feed").unwrap();
        assert_eq!(item.title, "Untitled");
        assert_eq!(item.source_url, "https://example.com/feed");
    }

    #[test]
    fn https_is_required() {
        assert!(ensure_https("https://example.com/rss").is_ok());
        assert!(ensure_https("HTTPS://example.com/rss").is_ok());
        assert_eq!(
            ensure_https("http://example.com/rss").unwrap_err().kind(),
            "transport"
        );
        assert!(ensure_https("ftp://example.com/rss").is_err());
        assert!(ensure_https("example.com/rss").is_err());
        assert!(ensure_https("https://").is_err());
        assert!(ensure_https("https//example.com/rss").is_err());
    }
}
