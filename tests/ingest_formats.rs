// tests/ingest_formats.rs
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use feed_digest_bot::error::Result;
use feed_digest_bot::ingest::feed::{parse_document, FeedFormat};
use feed_digest_bot::ingest::load_source;
use feed_digest_bot::ingest::providers::StaticFeedFetcher;
use feed_digest_bot::ingest::types::{FeedFetcher, FeedSource};

use common::fixture;

#[tokio::test]
async fn rss_fixture_normalizes_two_items() {
    let url = "https://news.example.com/feed.xml";
    let fetcher = StaticFeedFetcher::new().with_document(url, fixture("rss_two_items.xml"));
    let out = load_source(&fetcher, &FeedSource::new(url, "News")).await.unwrap();

    assert_eq!(out.items.len(), 2);
    assert_eq!(out.skipped_invalid, 0);

    let first = &out.items[0];
    assert_eq!(first.guid.as_deref(), Some("abc"));
    assert_eq!(first.link, "https://news.example.com/2025/06/cycling-network");
    assert_eq!(first.source_url, url);
    assert!(first.published.is_some());
    assert!(first.content.starts_with("The city council approved"));

    let second = &out.items[1];
    assert_eq!(second.guid, None);
    assert_eq!(
        second.published.unwrap().to_rfc3339(),
        "2025-06-09T18:30:00+00:00"
    );
}

#[tokio::test]
async fn atom_fixture_skips_linkless_entry_and_strips_markup() {
    let url = "https://blog.example.org/atom.xml";
    let fetcher = StaticFeedFetcher::new().with_document(url, fixture("atom_entries.xml"));
    let out = load_source(&fetcher, &FeedSource::new(url, "")).await.unwrap();

    assert_eq!(out.items.len(), 1);
    assert_eq!(out.skipped_invalid, 1);
    let item = &out.items[0];
    assert_eq!(item.link, "https://blog.example.org/posts/release-pipeline");
    assert_eq!(item.guid.as_deref(), Some("tag:blog.example.org,2025:42"));
    // content was longer than summary and its script is gone
    assert!(item.content.contains("Builds now finish"));
    assert!(!item.content.contains("track()"));
    for it in &out.items {
        assert!(!it.content.contains('<') && !it.content.contains('>'));
        assert!(!it.title.contains('<'));
    }
}

#[test]
fn rdf_root_is_an_item_list() {
    let doc = parse_document(&fixture("rdf_items.xml")).unwrap();
    assert_eq!(doc.format(), FeedFormat::ItemList);
    let raw = doc.into_raw_items();
    assert_eq!(raw.len(), 1);
    assert_eq!(
        raw[0].link.as_deref(),
        Some("https://science.example.net/articles/comet")
    );
    assert_eq!(raw[0].published.as_deref(), Some("2025-06-08T21:00:00Z"));
}

#[tokio::test]
async fn html_page_fails_format_detection() {
    let url = "https://example.com/moved";
    let fetcher = StaticFeedFetcher::new().with_document(url, fixture("not_a_feed.html"));
    let err = load_source(&fetcher, &FeedSource::new(url, "")).await.unwrap_err();
    assert_eq!(err.kind(), "parse");
}

struct CountingFetcher {
    calls: AtomicUsize,
}

#[async_trait]
impl FeedFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(fixture("rss_two_items.xml"))
    }
    fn name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn plain_http_is_rejected_before_any_fetch() {
    let fetcher = CountingFetcher {
        calls: AtomicUsize::new(0),
    };
    let err = load_source(&fetcher, &FeedSource::new("http://news.example.com/feed.xml", ""))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}
